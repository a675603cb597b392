//! Parsing of the mount argument vector.
//!
//! The vector follows the traditional userspace-filesystem shape:
//! `PROGRAM MOUNTPOINT [-o opt[,opt...]]... [-f] [-d] [-s]`.

use crate::config::MountConfig;
use clap::{ArgAction, Parser};
use fuser::MountOption;
use std::path::PathBuf;

/// Arguments understood by the fuser runtime.
#[derive(Debug, Clone, Parser)]
#[command(disable_version_flag = true)]
pub struct MountArgs {
    /// Directory to mount the filesystem on
    #[arg(value_name = "MOUNTPOINT")]
    pub mountpoint: PathBuf,

    /// Mount options, comma separated (may be repeated)
    #[arg(short = 'o', value_name = "OPTIONS", action = ArgAction::Append)]
    pub options: Vec<String>,

    /// Stay in the foreground (the runtime never daemonizes)
    #[arg(short = 'f')]
    pub foreground: bool,

    /// Accepted for compatibility; request logging follows RUST_LOG
    #[arg(short = 'd')]
    pub debug: bool,

    /// Accepted for compatibility; requests are always served on one thread
    #[arg(short = 's')]
    pub single_threaded: bool,
}

impl MountArgs {
    /// Every `-o` option, split on commas.
    pub fn raw_options(&self) -> impl Iterator<Item = &str> {
        self.options
            .iter()
            .flat_map(|o| o.split(','))
            .map(str::trim)
            .filter(|o| !o.is_empty())
    }

    /// The options to mount with, completing `fsname`/`subtype` from
    /// `config` when the argument vector does not set them.
    pub fn mount_options(&self, config: &MountConfig) -> Vec<MountOption> {
        let mut options: Vec<MountOption> = self.raw_options().map(parse_mount_option).collect();
        if !options.iter().any(|o| matches!(o, MountOption::FSName(_))) {
            options.push(MountOption::FSName(config.fsname.clone()));
        }
        if let Some(subtype) = &config.subtype
            && !options.iter().any(|o| matches!(o, MountOption::Subtype(_)))
        {
            options.push(MountOption::Subtype(subtype.clone()));
        }
        options
    }
}

/// Maps one `-o` option to its fuser form. Unknown options are passed
/// through verbatim.
pub fn parse_mount_option(option: &str) -> MountOption {
    if let Some(name) = option.strip_prefix("fsname=") {
        return MountOption::FSName(name.to_string());
    }
    if let Some(subtype) = option.strip_prefix("subtype=") {
        return MountOption::Subtype(subtype.to_string());
    }
    match option {
        "ro" => MountOption::RO,
        "rw" => MountOption::RW,
        "allow_other" => MountOption::AllowOther,
        "allow_root" => MountOption::AllowRoot,
        "auto_unmount" => MountOption::AutoUnmount,
        "default_permissions" => MountOption::DefaultPermissions,
        "dev" => MountOption::Dev,
        "nodev" => MountOption::NoDev,
        "suid" => MountOption::Suid,
        "nosuid" => MountOption::NoSuid,
        "exec" => MountOption::Exec,
        "noexec" => MountOption::NoExec,
        "atime" => MountOption::Atime,
        "noatime" => MountOption::NoAtime,
        "sync" => MountOption::Sync,
        "async" => MountOption::Async,
        "dirsync" => MountOption::DirSync,
        other => MountOption::CUSTOM(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> MountArgs {
        MountArgs::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_parses_traditional_vector() {
        let args = parse(&["memfs", "/mnt/x", "-o", "ro,allow_other", "-f", "-s"]);
        assert_eq!(args.mountpoint, PathBuf::from("/mnt/x"));
        assert!(args.foreground);
        assert!(args.single_threaded);
        assert!(!args.debug);
        assert_eq!(args.raw_options().collect::<Vec<_>>(), vec!["ro", "allow_other"]);
    }

    #[test]
    fn test_compat_flags_documented_as_accepted() {
        use clap::CommandFactory;

        let command = MountArgs::command();
        for flag in ['d', 's'] {
            let arg = command
                .get_arguments()
                .find(|a| a.get_short() == Some(flag))
                .unwrap();
            let help = arg.get_help().unwrap().to_string();
            assert!(help.starts_with("Accepted for compatibility"), "-{flag}: {help}");
        }
        let args = parse(&["memfs", "/mnt", "-d", "-s"]);
        assert!(args.debug && args.single_threaded);
    }

    #[test]
    fn test_repeated_o_flags_accumulate() {
        let args = parse(&["memfs", "-o", "ro", "/mnt", "-o", "noatime"]);
        assert_eq!(args.raw_options().count(), 2);
    }

    #[test]
    fn test_missing_mountpoint_is_usage_error() {
        let err = MountArgs::try_parse_from(["memfs"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_option_mapping() {
        assert_eq!(parse_mount_option("ro"), MountOption::RO);
        assert_eq!(
            parse_mount_option("fsname=demo"),
            MountOption::FSName("demo".to_string())
        );
        assert_eq!(
            parse_mount_option("max_read=4096"),
            MountOption::CUSTOM("max_read=4096".to_string())
        );
    }

    #[test]
    fn test_config_fills_fsname_and_subtype() {
        let config = MountConfig::default().fsname("memfs").subtype("demo");
        let options = parse(&["memfs", "/mnt"]).mount_options(&config);
        assert!(options.contains(&MountOption::FSName("memfs".to_string())));
        assert!(options.contains(&MountOption::Subtype("demo".to_string())));

        let options = parse(&["memfs", "/mnt", "-o", "fsname=mine"]).mount_options(&config);
        assert!(options.contains(&MountOption::FSName("mine".to_string())));
        assert!(!options.contains(&MountOption::FSName("memfs".to_string())));
    }
}
