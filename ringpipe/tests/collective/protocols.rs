use ringpipe::{CollOp, DataType, DeviceBuffer, Protocol, ReduceOp};

use super::helpers::{bootstrap, launch_all, rough_pattern};

async fn reduce_with(protocol: Protocol, count: usize, n_channels: usize) -> Vec<u8> {
    let comms = bootstrap(4, n_channels);
    let out = DeviceBuffer::zeroed(count * 4);
    for comm in &comms {
        let input = DeviceBuffer::from_elements(&rough_pattern(comm.rank(), count));
        let op = CollOp::reduce(input, out.clone(), count, DataType::F32, ReduceOp::Sum, 1)
            .with_protocol(protocol);
        comm.enqueue(op).unwrap();
    }
    launch_all(&comms).await.unwrap();
    out.to_bytes().unwrap()
}

#[tokio::test]
async fn test_protocols_bitwise_identical() {
    for (count, n_channels) in [(1024, 1), (1000, 3), (5, 2), (4099, 2)] {
        let simple = reduce_with(Protocol::Simple, count, n_channels).await;
        let ll = reduce_with(Protocol::Ll, count, n_channels).await;
        let ll128 = reduce_with(Protocol::Ll128, count, n_channels).await;
        assert_eq!(simple, ll, "ll differs for {count} x {n_channels}");
        assert_eq!(simple, ll128, "ll128 differs for {count} x {n_channels}");
    }
}

#[tokio::test]
async fn test_ring_order_of_combination() {
    // Ring 0 -> 1 -> 2 -> 0 with root 0: the chain starts at rank 1, so the
    // root computes x0 + (x2 + x1).
    let count = 64;
    let comms = bootstrap(3, 1);
    let out = DeviceBuffer::zeroed(count * 4);
    for comm in &comms {
        let input = DeviceBuffer::from_elements(&rough_pattern(comm.rank(), count));
        comm.enqueue(
            CollOp::reduce(input, out.clone(), count, DataType::F32, ReduceOp::Sum, 0)
                .with_protocol(Protocol::Ll128),
        )
        .unwrap();
    }
    launch_all(&comms).await.unwrap();

    let x: Vec<Vec<f32>> = (0..3).map(|r| rough_pattern(r, count)).collect();
    let expected: Vec<f32> = (0..count).map(|i| x[0][i] + (x[2][i] + x[1][i])).collect();
    let got = out.to_elements::<f32>().unwrap();
    for (g, e) in got.iter().zip(&expected) {
        assert_eq!(g.to_bits(), e.to_bits());
    }
}

#[tokio::test]
async fn test_profile_counts_payload() {
    let count = 1000;
    let comms = bootstrap(2, 1);
    let out = DeviceBuffer::zeroed(count * 4);
    for comm in &comms {
        let input = DeviceBuffer::from_elements(&vec![1.0f32; count]);
        comm.enqueue(
            CollOp::reduce(input, out.clone(), count, DataType::F32, ReduceOp::Sum, 0)
                .with_protocol(Protocol::Ll),
        )
        .unwrap();
    }
    launch_all(&comms).await.unwrap();

    let source = comms[1].channel_profile(0).unwrap();
    let root = comms[0].channel_profile(0).unwrap();
    assert_eq!(source.send_bytes, 4000);
    assert_eq!(source.recv_bytes, 0);
    assert_eq!(root.recv_bytes, 4000);
    assert_eq!(root.primitive_calls, source.primitive_calls);
    assert_eq!(root.ops_completed, 1);
}
