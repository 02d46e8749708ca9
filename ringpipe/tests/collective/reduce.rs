use ringpipe::{CollOp, Communicator, DataType, DeviceBuffer, ReduceOp};

use super::helpers::{bootstrap, launch_all, pattern, small_config};

#[tokio::test]
async fn test_reduce_4_ranks_sum_root_0() {
    let count = 1024;
    let comms = bootstrap(4, 2);
    let outputs: Vec<DeviceBuffer> = (0..4)
        .map(|_| DeviceBuffer::from_elements(&vec![-1.0f32; count]))
        .collect();

    for (comm, out) in comms.iter().zip(&outputs) {
        let input = DeviceBuffer::from_elements(&pattern(comm.rank(), count));
        let op = CollOp::reduce(input, out.clone(), count, DataType::F32, ReduceOp::Sum, 0);
        comm.enqueue(op).unwrap();
    }
    launch_all(&comms).await.unwrap();

    let expected: Vec<f32> = (0..count)
        .map(|i| (0..4).map(|r| pattern(r, count)[i]).sum())
        .collect();
    assert_eq!(outputs[0].to_elements::<f32>().unwrap(), expected);
    for out in &outputs[1..] {
        assert_eq!(out.to_elements::<f32>().unwrap(), vec![-1.0f32; count]);
    }
}

#[tokio::test]
async fn test_reduce_3_ranks_nonzero_root() {
    let count = 700;
    let comms = bootstrap(3, 1);
    let out = DeviceBuffer::zeroed(count * 4);
    for comm in &comms {
        let input = DeviceBuffer::from_elements(&vec![(comm.rank() + 1) as i32; count]);
        let recv = if comm.rank() == 2 {
            out.clone()
        } else {
            DeviceBuffer::zeroed(0)
        };
        comm.enqueue(CollOp::reduce(input, recv, count, DataType::I32, ReduceOp::Sum, 2))
            .unwrap();
    }
    launch_all(&comms).await.unwrap();
    assert_eq!(out.to_elements::<i32>().unwrap(), vec![6; count]);
}

#[tokio::test]
async fn test_reduce_two_ranks_max() {
    let comms = bootstrap(2, 2);
    let out = DeviceBuffer::zeroed(8 * 300);
    for comm in &comms {
        let values: Vec<i64> = (0..300)
            .map(|i| if (i + comm.rank() as i64) % 2 == 0 { i } else { -i })
            .collect();
        let input = DeviceBuffer::from_elements(&values);
        comm.enqueue(CollOp::reduce(input, out.clone(), 300, DataType::I64, ReduceOp::Max, 1))
            .unwrap();
    }
    launch_all(&comms).await.unwrap();
    let expected: Vec<i64> = (0..300).collect();
    assert_eq!(out.to_elements::<i64>().unwrap(), expected);
}

#[tokio::test]
async fn test_reduce_avg() {
    let count = 500;
    let comms = bootstrap(4, 3);
    let out = DeviceBuffer::zeroed(count * 8);
    for comm in &comms {
        let input = DeviceBuffer::from_elements(&vec![comm.rank() as f64; count]);
        comm.enqueue(CollOp::reduce(input, out.clone(), count, DataType::F64, ReduceOp::Avg, 3))
            .unwrap();
    }
    launch_all(&comms).await.unwrap();
    assert_eq!(out.to_elements::<f64>().unwrap(), vec![1.5; count]);
}

#[tokio::test]
async fn test_reduce_in_place_at_root() {
    let count = 256;
    let comms = bootstrap(3, 2);
    let root_buf = DeviceBuffer::from_elements(&vec![1u32; count]);
    for comm in &comms {
        let buf = if comm.rank() == 0 {
            root_buf.clone()
        } else {
            DeviceBuffer::from_elements(&vec![10u32; count])
        };
        comm.enqueue(CollOp::reduce(buf.clone(), buf, count, DataType::U32, ReduceOp::Sum, 0))
            .unwrap();
    }
    launch_all(&comms).await.unwrap();
    assert_eq!(root_buf.to_elements::<u32>().unwrap(), vec![21; count]);
}

#[tokio::test]
async fn test_reduce_permuted_ring() {
    let count = 1000;
    let rings = vec![vec![2, 0, 3, 1], vec![1, 3, 0, 2]];
    let comms = Communicator::bootstrap_local_with_rings(rings, small_config()).unwrap();
    let out = DeviceBuffer::zeroed(count * 4);
    for comm in &comms {
        let input = DeviceBuffer::from_elements(&pattern(comm.rank(), count));
        comm.enqueue(CollOp::reduce(input, out.clone(), count, DataType::F32, ReduceOp::Sum, 3))
            .unwrap();
    }
    launch_all(&comms).await.unwrap();
    let expected: Vec<f32> = (0..count)
        .map(|i| (0..4).map(|r| pattern(r, count)[i]).sum())
        .collect();
    assert_eq!(out.to_elements::<f32>().unwrap(), expected);
}

#[tokio::test]
async fn test_reduce_single_rank_copies() {
    let comms = bootstrap(1, 2);
    let input = DeviceBuffer::from_elements(&[3.0f32, 5.0, 7.0]);
    let out = DeviceBuffer::zeroed(12);
    comms[0]
        .enqueue(CollOp::reduce(input, out.clone(), 3, DataType::F32, ReduceOp::Avg, 0))
        .unwrap();
    launch_all(&comms).await.unwrap();
    assert_eq!(out.to_elements::<f32>().unwrap(), vec![3.0, 5.0, 7.0]);
}

#[tokio::test]
async fn test_reduce_zero_count() {
    let comms = bootstrap(3, 2);
    for comm in &comms {
        let buf = DeviceBuffer::zeroed(0);
        comm.enqueue(CollOp::reduce(buf.clone(), buf, 0, DataType::F32, ReduceOp::Sum, 0))
            .unwrap();
    }
    launch_all(&comms).await.unwrap();
    assert_eq!(comms[0].channel_profile(0).unwrap().ops_completed, 1);
}

#[tokio::test]
async fn test_reduce_u8_wraps() {
    let count = 333;
    let comms = bootstrap(4, 1);
    let out = DeviceBuffer::zeroed(count);
    for comm in &comms {
        let input = DeviceBuffer::from_elements(&vec![100u8; count]);
        comm.enqueue(CollOp::reduce(input, out.clone(), count, DataType::U8, ReduceOp::Sum, 0))
            .unwrap();
    }
    launch_all(&comms).await.unwrap();
    assert_eq!(out.to_elements::<u8>().unwrap(), vec![144u8; count]);
}
