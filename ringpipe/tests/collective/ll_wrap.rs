use ringpipe::{CollOp, Communicator, DataType, DeviceBuffer, Protocol, ReduceOp, RingConfig};

use super::helpers::{launch_all, pattern, small_config};

/// An 8-bit flag space with cleaning every 128 steps.
fn wrapping_config() -> RingConfig {
    RingConfig {
        ll_flag_max: 0x100,
        ll_clean_mask: 0x78,
        ..small_config()
    }
}

#[tokio::test]
async fn test_ll_flags_wrap_across_many_steps() {
    let comms = Communicator::bootstrap_local(3, 1, wrapping_config()).unwrap();
    // 1000 f32 take 8 LL steps, 37 take one: 30 of each is 270 steps.
    let counts: Vec<usize> = (0..60).map(|i| if i % 2 == 0 { 1000 } else { 37 }).collect();
    let outputs: Vec<DeviceBuffer> = counts.iter().map(|&n| DeviceBuffer::zeroed(n * 4)).collect();

    for comm in &comms {
        for (i, (&count, out)) in counts.iter().zip(&outputs).enumerate() {
            let input = DeviceBuffer::from_elements(&pattern(comm.rank() + i as u32, count));
            comm.enqueue(
                CollOp::reduce(input, out.clone(), count, DataType::F32, ReduceOp::Sum, 0)
                    .with_protocol(Protocol::Ll),
            )
            .unwrap();
        }
    }
    launch_all(&comms).await.unwrap();

    for (i, (&count, out)) in counts.iter().zip(&outputs).enumerate() {
        let expected: Vec<f32> = (0..count)
            .map(|j| (0..3).map(|r| pattern(r + i as u32, count)[j]).sum())
            .collect();
        assert_eq!(out.to_elements::<f32>().unwrap(), expected, "op {i}");
    }

    let channel = comms[1].channel(0).unwrap();
    let ring = channel.ring().clone();
    let mut peers = channel.peers().unwrap();
    let (_, send) = peers.ring_pair(ring.prev, ring.next, 0);
    let send = send.unwrap();
    assert_eq!(send.step(), 270);
    // Cleaning ran in the 248..=255 window.
    assert_eq!(send.ll_last_cleaning(), 255);
}

#[tokio::test]
async fn test_ll_and_simple_share_a_connection_across_wrap() {
    let comms = Communicator::bootstrap_local(2, 1, wrapping_config()).unwrap();
    let mut outputs = Vec::new();
    for i in 0..40 {
        let protocol = if i % 3 == 0 { Protocol::Simple } else { Protocol::Ll };
        let out = DeviceBuffer::zeroed(900 * 4);
        for comm in &comms {
            let input = DeviceBuffer::from_elements(&vec![(comm.rank() + i) as u32; 900]);
            comm.enqueue(
                CollOp::reduce(input, out.clone(), 900, DataType::U32, ReduceOp::Sum, 1)
                    .with_protocol(protocol),
            )
            .unwrap();
        }
        outputs.push((i, out));
    }
    launch_all(&comms).await.unwrap();
    for (i, out) in outputs {
        assert_eq!(out.to_elements::<u32>().unwrap(), vec![2 * i + 1; 900], "op {i}");
    }
}

#[tokio::test]
async fn test_ll_slot_idle_for_a_full_flag_cycle() {
    let comms = Communicator::bootstrap_local(2, 1, wrapping_config()).unwrap();
    // Each round is one LL step then 255 Simple steps, so every LL op lands
    // on step 0 mod 256 and expects the same flag as the one before it.
    let mut ll_outputs = Vec::new();
    for round in 0..6u32 {
        let out = DeviceBuffer::zeroed(4);
        for comm in &comms {
            let input = DeviceBuffer::from_elements(&[100 * (1 - comm.rank()) + round + 1]);
            comm.enqueue(
                CollOp::reduce(input, out.clone(), 1, DataType::U32, ReduceOp::Sum, 0)
                    .with_protocol(Protocol::Ll),
            )
            .unwrap();
        }
        ll_outputs.push((round, out));

        for comm in &comms {
            for _ in 0..255 {
                let buf = DeviceBuffer::from_elements(&[comm.rank()]);
                comm.enqueue(
                    CollOp::reduce(buf.clone(), buf, 1, DataType::U32, ReduceOp::Sum, 0)
                        .with_protocol(Protocol::Simple),
                )
                .unwrap();
            }
        }
    }
    launch_all(&comms).await.unwrap();

    for (round, out) in ll_outputs {
        // (101 + round) from the root plus (round + 1) from rank 1.
        assert_eq!(out.to_elements::<u32>().unwrap(), vec![102 + 2 * round], "round {round}");
    }

    let channel = comms[1].channel(0).unwrap();
    let ring = channel.ring().clone();
    let mut peers = channel.peers().unwrap();
    let (_, send) = peers.ring_pair(ring.prev, ring.next, 0);
    let send = send.unwrap();
    assert_eq!(send.step(), 6 * 256);
    // Simple steps in the 1528..=1535 window cleaned the LL slots too.
    assert_eq!(send.ll_last_cleaning(), 6 * 256 - 1);
}
