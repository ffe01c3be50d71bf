//! CLI argument parsing

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Wardmon - distributed reachability and liveness monitor
///
/// One monitor accepts any number of testers; each tester fetches its
/// probe configuration from the monitor, then periodically probes its
/// targets with ICMP Echo, ICMP Timestamp, and HTTP content checks,
/// reporting per-target measurements back.
#[derive(Parser, Debug)]
#[command(
    name = "wardmon",
    version,
    about = "Distributed reachability and liveness monitor",
    after_help = "EXAMPLES:\n\
    # Start the monitor role\n\
    wardmon monitor.conf\n\n\
    # Start a tester, overriding the role in the file\n\
    wardmon --role tester probes.conf\n\n\
    ICMP probes need raw-socket privileges (CAP_NET_RAW or root)."
)]
pub struct Args {
    /// Path to the configuration file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Override the role declared in the configuration file
    #[arg(long, value_enum)]
    pub role: Option<Role>,

    /// Increase diagnostic verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Monitor,
    Tester,
}

impl Role {
    /// The role named in a config file, if it is a known one
    pub fn from_config_value(value: &str) -> Option<Role> {
        match value {
            "monitor" => Some(Role::Monitor),
            "tester" => Some(Role::Tester),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_is_required() {
        assert!(Args::try_parse_from(["wardmon"]).is_err());
        let args = Args::try_parse_from(["wardmon", "probes.conf"]).unwrap();
        assert_eq!(args.config, PathBuf::from("probes.conf"));
        assert_eq!(args.role, None);
    }

    #[test]
    fn test_role_override() {
        let args = Args::try_parse_from(["wardmon", "--role", "tester", "probes.conf"]).unwrap();
        assert_eq!(args.role, Some(Role::Tester));
    }

    #[test]
    fn test_role_from_config_value() {
        assert_eq!(Role::from_config_value("monitor"), Some(Role::Monitor));
        assert_eq!(Role::from_config_value("tester"), Some(Role::Tester));
        assert_eq!(Role::from_config_value("observer"), None);
    }
}
