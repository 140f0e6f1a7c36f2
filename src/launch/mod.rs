mod params;
mod supervisor;

pub use params::{
    build_launch_args, mod_clause, sanitize_mod_name, select_executable, LaunchCommand,
};
pub use supervisor::{ConsoleSink, LogEvent, OutputStream, ProcessSupervisor, TracingSink};
