//! Runtime configuration from the environment.
//!
//! `KURA_MEM` configures the stack and heap budgets as
//! `STACK_SZ;NEW_SPC,OLD_SPC_NEW:OLD_SPC_MAX,BIG_SPC_NEW:BIG_SPC_MAX`
//! (sizes in slots).  `KURA_PATH` is the `:`-separated module search path.
//! `KURA_DEBUG_LOG` selects logging as `LEVEL:GROUP:FILE`.  Malformed specs
//! fall back to the defaults.

use std::path::PathBuf;

use log::warn;
use regex::Regex;

use crate::mem::MemConfig;

pub const ENV_MEM: &str = "KURA_MEM";
pub const ENV_PATH: &str = "KURA_PATH";
pub const ENV_DEBUG_LOG: &str = "KURA_DEBUG_LOG";

#[derive(Clone, Debug)]
pub struct RuntimeOptions {
    pub stack_size: usize,
    pub mem: MemConfig,
    pub module_path: Vec<PathBuf>,
}

impl Default for RuntimeOptions {
    fn default() -> RuntimeOptions {
        RuntimeOptions {
            stack_size: 4096,
            mem: MemConfig::default(),
            module_path: Vec::new(),
        }
    }
}

impl RuntimeOptions {
    /// Read the options from the environment.
    pub fn from_env() -> RuntimeOptions {
        let mut options = RuntimeOptions::default();
        if let Ok(spec) = std::env::var(ENV_MEM) {
            match parse_mem_spec(&spec) {
                Some((stack_size, mem)) => {
                    options.stack_size = stack_size;
                    options.mem = mem;
                }
                None => warn!(target: "kura::options", "ignoring malformed {ENV_MEM}: {spec}"),
            }
        }
        if let Ok(path) = std::env::var(ENV_PATH) {
            options.module_path = path
                .split(':')
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .collect();
        }
        options
    }
}

fn parse_mem_spec(spec: &str) -> Option<(usize, MemConfig)> {
    let re = Regex::new(r"^(\d+);(\d+),(\d+):(\d+),(\d+):(\d+)$").unwrap();
    let caps = re.captures(spec.trim())?;
    let num = |i: usize| caps.get(i).unwrap().as_str().parse::<usize>().ok();
    let stack_size = num(1)?;
    let mem = MemConfig {
        young_cap: num(2)?,
        old_cap_new: num(3)?,
        old_cap_max: num(4)?,
        fixed_cap_new: num(5)?,
        fixed_cap_max: num(6)?,
    };
    if stack_size == 0
        || mem.young_cap == 0
        || mem.old_cap_new == 0
        || mem.old_cap_max < mem.old_cap_new
        || mem.fixed_cap_new == 0
        || mem.fixed_cap_max < mem.fixed_cap_new
    {
        return None;
    }
    Some((stack_size, mem))
}

/// A parsed `LEVEL:GROUP:FILE` debug-log spec.  LEVEL and GROUP narrow what
/// is logged; FILE of `-` means standard error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DebugLogSpec {
    pub level: String,
    pub group: String,
    pub file: Option<String>,
}

impl DebugLogSpec {
    pub fn parse(spec: &str) -> Option<DebugLogSpec> {
        let re = Regex::new(r"^([A-Za-z]+):([A-Za-z0-9_*]*):(.*)$").unwrap();
        let caps = re.captures(spec.trim())?;
        let file = caps.get(3).unwrap().as_str();
        Some(DebugLogSpec {
            level: caps.get(1).unwrap().as_str().to_lowercase(),
            group: caps.get(2).unwrap().as_str().to_string(),
            file: (!file.is_empty() && file != "-").then(|| file.to_string()),
        })
    }

    /// The spec as an env_logger-style filter directive.
    pub fn filter_directive(&self) -> String {
        if self.group.is_empty() || self.group == "*" {
            self.level.clone()
        } else {
            format!("kura::{}={}", self.group.to_lowercase(), self.level)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mem_spec() {
        let (stack, mem) = parse_mem_spec("1024;2048,4096:65536,512:8192").unwrap();
        assert_eq!(stack, 1024);
        assert_eq!(mem.young_cap, 2048);
        assert_eq!(mem.old_cap_new, 4096);
        assert_eq!(mem.old_cap_max, 65536);
        assert_eq!(mem.fixed_cap_new, 512);
        assert_eq!(mem.fixed_cap_max, 8192);
    }

    #[test]
    fn rejects_malformed_mem_specs() {
        assert!(parse_mem_spec("").is_none());
        assert!(parse_mem_spec("1024").is_none());
        assert!(parse_mem_spec("0;1,1:1,1:1").is_none());
        assert!(parse_mem_spec("1;1,4:2,1:1").is_none()); // max below initial
        assert!(parse_mem_spec("a;b,c:d,e:f").is_none());
    }

    #[test]
    fn parses_debug_log_spec() {
        let spec = DebugLogSpec::parse("DEBUG:Lexer:-").unwrap();
        assert_eq!(spec.level, "debug");
        assert_eq!(spec.group, "Lexer");
        assert_eq!(spec.file, None);
        assert_eq!(spec.filter_directive(), "kura::lexer=debug");
        let spec = DebugLogSpec::parse("TRACE::log.txt").unwrap();
        assert_eq!(spec.filter_directive(), "trace");
        assert_eq!(spec.file.as_deref(), Some("log.txt"));
    }
}
