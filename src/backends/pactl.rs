// SPDX-License-Identifier: GPL-3.0-only

//! Helper module host backed by `pactl`
//!
//! Works against PulseAudio and against PipeWire's pulse server.

use crate::classify::{ModuleHost, ModuleIndex};
use crate::errors::ModuleError;
use std::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct PactlModuleHost {
    /// Print the commands instead of running them
    dry_run: bool,
    next_dry_index: u32,
}

impl PactlModuleHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            next_dry_index: 0,
        }
    }

    fn run_unload(&self, index: ModuleIndex) {
        if self.dry_run {
            println!("pactl unload-module {}", index);
            return;
        }

        match Command::new("pactl")
            .arg("unload-module")
            .arg(index.to_string())
            .output()
        {
            Ok(output) if output.status.success() => {
                debug!(%index, "module unloaded");
            }
            Ok(output) => {
                warn!(
                    %index,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "pactl unload-module failed"
                );
            }
            Err(e) => warn!(%index, "Failed to run pactl: {}", e),
        }
    }
}

/// `pactl load-module` prints the new module index on success
fn parse_index(stdout: &str) -> Option<ModuleIndex> {
    stdout.trim().parse::<u32>().ok().map(ModuleIndex)
}

impl ModuleHost for PactlModuleHost {
    fn load(&mut self, name: &str, args: Option<&str>) -> Result<ModuleIndex, ModuleError> {
        if self.dry_run {
            println!("pactl load-module {} {}", name, args.unwrap_or(""));
            self.next_dry_index += 1;
            return Ok(ModuleIndex(self.next_dry_index));
        }

        let mut command = Command::new("pactl");
        command.arg("load-module").arg(name);
        if let Some(args) = args {
            command.args(args.split_whitespace());
        }

        let output = command
            .output()
            .map_err(|e| ModuleError::HostUnavailable(format!("Failed to run pactl: {}", e)))?;

        if !output.status.success() {
            return Err(ModuleError::LoadFailed {
                name: name.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_index(&stdout).ok_or_else(|| ModuleError::LoadFailed {
            name: name.to_string(),
            reason: format!("unexpected pactl output '{}'", stdout.trim()),
        })
    }

    fn unload(&mut self, index: ModuleIndex) {
        self.run_unload(index);
    }

    // pactl has no deferred unload; the request is served right away
    fn request_unload(&mut self, index: ModuleIndex) {
        self.run_unload(index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_index() {
        assert_eq!(parse_index("536870913\n"), Some(ModuleIndex(536870913)));
        assert_eq!(parse_index("Failure: No such entity"), None);
    }

    #[test]
    fn test_dry_run_hands_out_indices() {
        let mut host = PactlModuleHost::dry_run();
        assert_eq!(host.load("module-null-sink", None), Ok(ModuleIndex(1)));
        assert_eq!(
            host.load("module-loopback", Some("latency_msec=20")),
            Ok(ModuleIndex(2))
        );
    }
}
