use ringpipe::{CollOp, DataType, DeviceBuffer, Protocol};

use super::helpers::{bootstrap, launch_all};

#[tokio::test]
async fn test_broadcast_all_protocols() {
    let count = 777;
    let data: Vec<u8> = (0..count).map(|i| (i * 13 % 251) as u8).collect();
    for protocol in Protocol::ALL {
        let comms = bootstrap(4, 2);
        let outputs: Vec<DeviceBuffer> = (0..4).map(|_| DeviceBuffer::zeroed(count)).collect();
        for (comm, out) in comms.iter().zip(&outputs) {
            let send = if comm.rank() == 2 {
                DeviceBuffer::from_elements(&data)
            } else {
                DeviceBuffer::zeroed(0)
            };
            comm.enqueue(
                CollOp::broadcast(send, out.clone(), count, DataType::U8, 2).with_protocol(protocol),
            )
            .unwrap();
        }
        launch_all(&comms).await.unwrap();
        for (rank, out) in outputs.iter().enumerate() {
            assert_eq!(out.to_bytes().unwrap(), data, "{protocol} rank {rank}");
        }
    }
}

#[tokio::test]
async fn test_broadcast_in_place() {
    let count = 2048;
    let comms = bootstrap(3, 1);
    let buffers: Vec<DeviceBuffer> = (0..3)
        .map(|r| DeviceBuffer::from_elements(&vec![r as f32; count]))
        .collect();
    for (comm, buf) in comms.iter().zip(&buffers) {
        comm.enqueue(
            CollOp::broadcast(buf.clone(), buf.clone(), count, DataType::F32, 0)
                .with_protocol(Protocol::Ll),
        )
        .unwrap();
    }
    launch_all(&comms).await.unwrap();
    for buf in &buffers {
        assert_eq!(buf.to_elements::<f32>().unwrap(), vec![0.0; count]);
    }
}

#[tokio::test]
async fn test_broadcast_half_precision_payload() {
    // F16 cannot be reduced but can be moved.
    let count = 300;
    let comms = bootstrap(2, 1);
    let payload: Vec<u8> = (0..count * 2).map(|i| i as u8).collect();
    let outputs: Vec<DeviceBuffer> = (0..2).map(|_| DeviceBuffer::zeroed(count * 2)).collect();
    for (comm, out) in comms.iter().zip(&outputs) {
        let send = DeviceBuffer::from_bytes(payload.clone());
        comm.enqueue(
            CollOp::broadcast(send, out.clone(), count, DataType::F16, 0)
                .with_protocol(Protocol::Ll128),
        )
        .unwrap();
    }
    launch_all(&comms).await.unwrap();
    assert_eq!(outputs[1].to_bytes().unwrap(), payload);
    assert_eq!(outputs[0].to_bytes().unwrap(), payload);
}
