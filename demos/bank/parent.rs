use std::io;
use std::process::Command;

use log::info;

use shmbank::error::{Error, Result};
use shmbank::{Account, Participant, Shm};

const SEGMENT: &str = "/shmbank";

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let seed: Option<u64> = std::env::args().nth(1).map(|arg| arg.parse().unwrap());

    info!("the concurrency demo begins");

    // A crashed run may have left the segment behind.
    Shm::unlink(SEGMENT)?;
    let mut shm = Shm::new(SEGMENT, size_of::<Account>())?;
    Account::init_in(&mut shm, 0)?;
    info!("parent mapped a one-account segment and armed the semaphore");

    // The withdrawer example binary sits next to this one.
    let mut exe = std::env::current_exe().map_err(Error::spawn)?;
    exe.set_file_name("bank_withdrawer");
    let mut command = Command::new(exe);
    if let Some(seed) = seed {
        command.arg((seed + 1).to_string());
    }
    let mut child = command.spawn().map_err(Error::spawn)?;
    info!("parent forked off the withdrawer");

    let account = Account::attach(&shm)?;
    let mut depositor = Participant::depositor();
    if let Some(seed) = seed {
        depositor = depositor.seeded(seed);
    }
    depositor.transact(account)?;

    let status = child.wait().map_err(Error::spawn)?;
    if !status.success() {
        return Err(Error::spawn(io::Error::new(
            io::ErrorKind::Other,
            "withdrawer exited with failure",
        )));
    }
    info!("parent observed the withdrawer's completion");

    let balance = account.balance()?;
    info!("final balance = ${}", balance);

    shm.close()?;
    info!("parent detached and removed the segment");
    Ok(())
}
