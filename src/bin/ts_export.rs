//! Writes TypeScript bindings for the types UI consumers receive
use mealplan_progress_lib::domain::{
    JobId, JobStatus, NotifierMessage, NotifierMessageKind, ProgressExtra, ProgressSnapshot,
};
use ts_rs::TS;

fn main() {
    let exports = [
        (JobId::name(), JobId::export()),
        (JobStatus::name(), JobStatus::export()),
        (ProgressExtra::name(), ProgressExtra::export()),
        (ProgressSnapshot::name(), ProgressSnapshot::export()),
        (NotifierMessageKind::name(), NotifierMessageKind::export()),
        (NotifierMessage::name(), NotifierMessage::export()),
    ];

    let mut failed = false;
    for (name, result) in exports {
        match result {
            Ok(()) => println!("exported {name}"),
            Err(e) => {
                eprintln!("{name} export error: {e}");
                failed = true;
            }
        }
    }
    if failed {
        std::process::exit(1);
    }
}
