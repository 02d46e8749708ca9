use ringpipe::{
    Algorithm, CollFunc, CollOp, Communicator, DataType, DeviceBuffer, Protocol, ReduceOp,
    RingError, is_supported,
};
use tokio_util::sync::CancellationToken;

use super::helpers::{bootstrap, small_config};

#[test]
fn test_supported_table() {
    let funcs = [
        CollFunc::Broadcast,
        CollFunc::Reduce,
        CollFunc::AllGather,
        CollFunc::ReduceScatter,
        CollFunc::AllReduce,
    ];
    let algorithms = [Algorithm::Tree, Algorithm::Ring, Algorithm::CollNet];
    let mut supported = 0;
    for func in funcs {
        for algorithm in algorithms {
            for protocol in Protocol::ALL {
                if is_supported(func, algorithm, protocol) {
                    assert_eq!(algorithm, Algorithm::Ring);
                    assert!(matches!(func, CollFunc::Reduce | CollFunc::Broadcast));
                    supported += 1;
                }
            }
        }
    }
    assert_eq!(supported, 6);
}

#[test]
fn test_unsupported_is_rejected_at_enqueue() {
    let comms = bootstrap(2, 1);
    let buf = DeviceBuffer::zeroed(64);
    let base = CollOp::reduce(buf.clone(), buf, 16, DataType::F32, ReduceOp::Sum, 0);

    for op in [
        base.clone().with_algorithm(Algorithm::Tree),
        base.clone().with_algorithm(Algorithm::CollNet).with_protocol(Protocol::Ll),
        CollOp {
            func: CollFunc::AllReduce,
            ..base.clone()
        },
    ] {
        let err = comms[0].enqueue(op).unwrap_err();
        assert!(matches!(err, RingError::Unsupported { .. }), "{err}");
    }
    assert!(comms[0].channel(0).unwrap().work_queue().is_empty());
    assert_eq!(comms[0].op_count(), 0);
}

#[test]
fn test_enqueue_requires_connections() {
    let rings = vec![vec![0, 1, 2]];
    let comm = Communicator::new(1, 3, &rings, small_config(), CancellationToken::new()).unwrap();
    let buf = DeviceBuffer::zeroed(64);
    let err = comm
        .enqueue(CollOp::broadcast(buf.clone(), buf, 16, DataType::F32, 0))
        .unwrap_err();
    assert!(
        matches!(
            err,
            RingError::NotConnected {
                channel: 0,
                peer: 0,
                ..
            }
        ),
        "{err}"
    );
}
