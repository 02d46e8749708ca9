use std::time::Duration;

use ringpipe::{
    Algorithm, CollFunc, CollOp, CollWork, DataType, DeviceBuffer, NUM_STEPS, Protocol, ReduceOp,
    RingError, WorkDescriptor,
};

use super::helpers::bootstrap;

#[tokio::test]
async fn test_abort_unblocks_waiting_root() {
    let comms = bootstrap(2, 1);
    let buf = DeviceBuffer::zeroed(4096);
    comms[0]
        .enqueue(CollOp::reduce(buf.clone(), buf, 1024, DataType::F32, ReduceOp::Sum, 0))
        .unwrap();

    // Rank 1 never launches, so the root waits for data forever.
    let handle = comms[0].launch();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!handle.is_finished());

    comms[0].abort();
    let err = tokio::time::timeout(Duration::from_secs(10), handle.wait())
        .await
        .expect("abort did not unblock the root")
        .unwrap_err();
    assert!(err.is_cancelled(), "{err}");

    let profile = comms[0].channel_profile(0).unwrap();
    assert!(profile.recv_wait_polls > 0);
    assert_eq!(profile.ops_completed, 0);

    let channel = comms[0].channel(0).unwrap();
    let mut peers = channel.peers().unwrap();
    let (recv, _) = peers.ring_pair(1, 1, 0);
    let recv = recv.unwrap();
    assert_eq!(recv.step(), 0);
    assert_eq!(recv.conn().head(), 0);
}

#[tokio::test]
async fn test_abort_unblocks_sender_on_full_window() {
    let comms = bootstrap(2, 1);
    // 4096 f32 over 1 KiB Simple steps is 16 steps, twice the window.
    let buf = DeviceBuffer::zeroed(4096 * 4);
    comms[1]
        .enqueue(CollOp::reduce(buf.clone(), buf, 4096, DataType::F32, ReduceOp::Sum, 0))
        .unwrap();

    let handle = comms[1].launch();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!handle.is_finished());

    comms[1].abort();
    let err = tokio::time::timeout(Duration::from_secs(10), handle.wait())
        .await
        .expect("abort did not unblock the sender")
        .unwrap_err();
    assert!(err.is_cancelled());

    let channel = comms[1].channel(0).unwrap();
    let mut peers = channel.peers().unwrap();
    let (_, send) = peers.ring_pair(0, 0, 0);
    let send = send.unwrap();
    assert_eq!(send.step(), NUM_STEPS as u64);
    assert_eq!(send.conn().tail(), NUM_STEPS as u64);
    assert!(comms[1].channel_profile(0).unwrap().send_wait_polls > 0);
}

#[tokio::test]
async fn test_abort_discards_queued_work() {
    let comms = bootstrap(3, 2);
    for comm in &comms {
        for _ in 0..3 {
            let buf = DeviceBuffer::zeroed(256);
            comm.enqueue(CollOp::reduce(buf.clone(), buf, 64, DataType::U32, ReduceOp::Min, 0))
                .unwrap();
        }
    }
    comms[2].abort();
    for comm in &comms {
        let err = comm.launch().wait().await.unwrap_err();
        assert!(err.is_cancelled());
        for id in 0..2 {
            assert!(comm.channel(id).unwrap().work_queue().is_empty());
            assert_eq!(comm.channel_profile(id).unwrap().primitive_calls, 0);
        }
    }
}

#[tokio::test]
async fn test_failed_rank_unblocks_its_peers() {
    let comms = bootstrap(2, 1);
    let root_buf = DeviceBuffer::zeroed(1024 * 4);
    comms[0]
        .enqueue(CollOp::reduce(root_buf.clone(), root_buf, 1024, DataType::F32, ReduceOp::Sum, 0))
        .unwrap();
    // Rank 1 gets a descriptor whose input is too short, as a corrupted
    // submission would leave it. Its first send fails on the read.
    let short = DeviceBuffer::zeroed(16);
    comms[1]
        .channel(0)
        .unwrap()
        .work_queue()
        .push(WorkDescriptor::Coll(CollWork {
            func: CollFunc::Reduce,
            algorithm: Algorithm::Ring,
            protocol: Protocol::Simple,
            n_threads: 32,
            send_buff: short.clone(),
            recv_buff: short,
            count: 1024,
            dtype: DataType::F32,
            last_chunk_size: 0,
            op: ReduceOp::Sum,
            red_op_arg: 0,
            root: 0,
            bid: 0,
            n_channels: 1,
            conn_index: 0,
            op_count: 0,
        }))
        .unwrap();

    let root = comms[0].launch();
    let source = comms[1].launch();
    let err = source.wait().await.unwrap_err();
    assert!(matches!(err, RingError::OutOfBounds { .. }), "{err}");

    // Nobody called abort: the failure fired the shared token.
    let err = tokio::time::timeout(Duration::from_secs(10), root.wait())
        .await
        .expect("root still waiting on the failed rank")
        .unwrap_err();
    assert!(err.is_cancelled(), "{err}");
    assert!(comms[0].is_aborted());
}
