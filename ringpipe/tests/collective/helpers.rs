use ringpipe::{Communicator, LaunchGroup, Rank, RingConfig};

/// Narrow groups and small buffers so short vectors span many steps.
///
/// Per-step payloads: Simple 1024 B, LL 512 B, LL128 480 B.
pub fn small_config() -> RingConfig {
    RingConfig {
        n_threads: 32,
        buff_sizes: [8 * 1024, 4 * 1024, 8 * 1024],
        spins_before_yield: 16,
        ..RingConfig::default()
    }
}

pub fn bootstrap(n_ranks: u32, n_channels: usize) -> Vec<Communicator> {
    Communicator::bootstrap_local(n_ranks, n_channels, small_config()).unwrap()
}

/// Launch every rank and wait for all of them.
pub async fn launch_all(comms: &[Communicator]) -> ringpipe::Result<()> {
    comms
        .iter()
        .map(Communicator::launch)
        .collect::<LaunchGroup>()
        .wait_all()
        .await
}

/// Exactly representable per-rank test values.
pub fn pattern(rank: Rank, count: usize) -> Vec<f32> {
    (0..count)
        .map(|i| ((i * 31 + rank as usize * 17) % 97) as f32 * 0.25 + rank as f32)
        .collect()
}

/// Values whose sums depend on association order.
pub fn rough_pattern(rank: Rank, count: usize) -> Vec<f32> {
    (0..count)
        .map(|i| {
            let x = (i as f32 + 1.0) * (rank as f32 + 1.3);
            x.sin() * 1e3 + 1.0 / (x + 0.7)
        })
        .collect()
}
