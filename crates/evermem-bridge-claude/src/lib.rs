pub mod redact;
pub mod render;

mod admin;
mod dispatch;
mod history;
mod parse;

pub use admin::{
    doctor, install, merge_hooks, settings_path, strip_hooks, uninstall, DoctorCheck, InstallReport,
    HOOK_COMMAND, HOOK_EVENTS,
};
pub use dispatch::{dispatch, hook_entrypoint_from_stdin, store_pair, HookEnv, HookResult, StoreOutcome};
pub use history::{
    add_history, extract_history, upload_history, upload_records, AddReport, ExtractReport,
    HistoryStats, UploadPreview, UploadReport,
};
pub use parse::HookInput;
