use log::info;

use shmbank::error::Result;
use shmbank::{Account, Participant, Shm};

const SEGMENT: &str = "/shmbank";

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let seed: Option<u64> = std::env::args().nth(1).map(|arg| arg.parse().unwrap());

    // The parent created and initialized the segment before spawning us.
    let shm = Shm::open(SEGMENT)?;
    let account = Account::attach(&shm)?;

    let mut withdrawer = Participant::withdrawer();
    if let Some(seed) = seed {
        withdrawer = withdrawer.seeded(seed);
    }
    withdrawer.transact(account)?;

    info!("withdrawer exits");
    Ok(())
}
