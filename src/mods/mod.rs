mod installer;
mod modlist;

pub use installer::{ContentInstaller, InstallReport, InstalledMod, ModFailure};
pub use modlist::{parse_mod_list, read_mod_list, ModEntry, ModListParse, ModSet, SkippedLine};
