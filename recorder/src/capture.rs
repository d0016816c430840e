//! Stream capture – runs `streamlink` as a child process for one broadcast.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::Path;
use std::process::{Child, Command, ExitStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, error, info, warn};

/// Oldest supported streamlink major version.
pub const MIN_MAJOR_VERSION: u64 = 2;

/// Flags that turn off host redirection and ad segments.
const TWITCH_FLAGS: &[&str] = &["--twitch-disable-hosting", "--twitch-disable-ads"];

/// How often the child is checked while waiting for it to exit.
const WAIT_POLL: Duration = Duration::from_millis(500);

/// How a capture run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Success,
    /// Non-zero exit, killed by a signal (`None`), or not started at all.
    Failure(Option<i32>),
}

impl From<ExitStatus> for ExitOutcome {
    fn from(status: ExitStatus) -> Self {
        if status.success() {
            ExitOutcome::Success
        } else {
            ExitOutcome::Failure(status.code())
        }
    }
}

/// Something that records `login` at `quality` into `output` and blocks
/// until the recording ends.
pub trait Capturer {
    fn capture(&mut self, login: &str, quality: &str, output: &Path) -> ExitOutcome;
}

/// Parse `streamlink X.Y.Z` out of `--version` output.
pub fn parse_version(output: &str) -> Option<(u64, u64, u64)> {
    let re = Regex::new(r"(?i)streamlink (\d+)\.(\d+)\.(\d+)").ok()?;
    let caps = re.captures(output)?;
    let part = |i: usize| caps.get(i).and_then(|m| m.as_str().parse().ok());
    Some((part(1)?, part(2)?, part(3)?))
}

/// Make sure `program` is a streamlink new enough to use.
pub fn check_streamlink(program: &str) -> Result<(u64, u64, u64)> {
    let output = match Command::new(program).arg("--version").output() {
        Ok(o) => o,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            anyhow::bail!("Cannot find {program}! Install streamlink first.")
        }
        Err(e) => return Err(e).with_context(|| format!("Cannot run {program} --version")),
    };

    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    let version = parse_version(&text)
        .with_context(|| format!("Cannot parse version from {program}: {}", text.trim()))?;

    if version.0 < MIN_MAJOR_VERSION {
        anyhow::bail!(
            "streamlink {}.{}.{} is too old, {}.0.0 or newer is required",
            version.0,
            version.1,
            version.2,
            MIN_MAJOR_VERSION
        );
    }

    info!("Found streamlink {}.{}.{}", version.0, version.1, version.2);
    Ok(version)
}

/// Arguments passed to streamlink for one recording.
pub fn command_args(login: &str, quality: &str, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = TWITCH_FLAGS.iter().map(OsString::from).collect();
    args.push(format!("twitch.tv/{login}").into());
    args.push(quality.into());
    args.push("-o".into());
    args.push(output.as_os_str().to_owned());
    args
}

/// Runs the real `streamlink` binary.
pub struct Streamlink {
    program: String,
    shutdown: Arc<AtomicBool>,
}

impl Streamlink {
    pub fn new(program: &str, shutdown: Arc<AtomicBool>) -> Self {
        Streamlink {
            program: program.to_string(),
            shutdown,
        }
    }

    /// Block until `child` exits.  A shutdown request kills it.
    fn wait(&self, child: &mut Child) -> ExitOutcome {
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return status.into(),
                Ok(None) => {}
                Err(e) => {
                    warn!("Cannot check streamlink status: {e}");
                    return child.wait().map(ExitOutcome::from).unwrap_or(ExitOutcome::Failure(None));
                }
            }

            if self.shutdown.load(Ordering::Relaxed) {
                info!("Stopping streamlink (pid={})", child.id());
                if let Err(e) = child.kill() {
                    debug!("Cannot kill streamlink: {e}");
                }
                return child.wait().map(ExitOutcome::from).unwrap_or(ExitOutcome::Failure(None));
            }

            std::thread::sleep(WAIT_POLL);
        }
    }
}

impl Capturer for Streamlink {
    fn capture(&mut self, login: &str, quality: &str, output: &Path) -> ExitOutcome {
        let args = command_args(login, quality, output);
        debug!("Spawning: {} {:?}", self.program, args);

        let mut child = match Command::new(&self.program).args(&args).spawn() {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to spawn {}: {e}", self.program);
                return ExitOutcome::Failure(None);
            }
        };

        info!("streamlink started (pid={})", child.id());
        let outcome = self.wait(&mut child);
        debug!("streamlink exited: {outcome:?}");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("streamlink 6.7.4\n"), Some((6, 7, 4)));
        assert_eq!(parse_version("Streamlink 2.0.0"), Some((2, 0, 0)));
        assert_eq!(parse_version("streamlink-cli"), None);
        assert_eq!(parse_version(""), None);
    }

    #[test]
    fn test_command_args() {
        let args = command_args("foo", "best", Path::new("./foo/[foo]240601_100000_x.ts"));
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.into_string().unwrap())
            .collect();
        assert_eq!(
            args,
            [
                "--twitch-disable-hosting",
                "--twitch-disable-ads",
                "twitch.tv/foo",
                "best",
                "-o",
                "./foo/[foo]240601_100000_x.ts",
            ]
        );
    }

    #[test]
    fn test_missing_program() {
        let err = check_streamlink("/nonexistent/streamlink-binary").unwrap_err();
        assert!(err.to_string().contains("Cannot find"));
    }

    /// Run `check_streamlink` against a script that prints `version_line`.
    #[cfg(unix)]
    fn check_fake_streamlink(version_line: &str) -> Result<(u64, u64, u64)> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("streamlink");
        std::fs::write(&script, format!("#!/bin/sh\necho '{version_line}'\n")).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        // a concurrent fork can briefly hold the fresh file open (ETXTBSY)
        let program = script.to_str().unwrap();
        for _ in 0..10 {
            match check_streamlink(program) {
                Err(e) if format!("{e:#}").contains("busy") => {
                    std::thread::sleep(Duration::from_millis(50));
                }
                other => return other,
            }
        }
        check_streamlink(program)
    }

    #[cfg(unix)]
    #[test]
    fn test_old_streamlink_rejected() {
        let err = check_fake_streamlink("streamlink 1.7.0").unwrap_err();
        assert!(err.to_string().contains("too old"), "{err:#}");
    }

    #[cfg(unix)]
    #[test]
    fn test_supported_streamlink_accepted() {
        assert_eq!(check_fake_streamlink("streamlink 2.0.0").unwrap(), (2, 0, 0));
        assert_eq!(check_fake_streamlink("streamlink 6.7.4").unwrap(), (6, 7, 4));
    }

    #[cfg(unix)]
    #[test]
    fn test_unparsable_version_rejected() {
        let err = check_fake_streamlink("some other tool 3.0").unwrap_err();
        assert!(err.to_string().contains("Cannot parse version"), "{err:#}");
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_outcome_from_status() {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(ExitOutcome::from(ExitStatus::from_raw(0)), ExitOutcome::Success);
        assert_eq!(
            ExitOutcome::from(ExitStatus::from_raw(1 << 8)),
            ExitOutcome::Failure(Some(1))
        );
        // SIGKILL
        assert_eq!(ExitOutcome::from(ExitStatus::from_raw(9)), ExitOutcome::Failure(None));
    }

    #[cfg(unix)]
    #[test]
    fn test_capture_runs_program() {
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut ok = Streamlink::new("true", shutdown.clone());
        assert_eq!(ok.capture("foo", "best", Path::new("x.ts")), ExitOutcome::Success);
        let mut bad = Streamlink::new("false", shutdown);
        assert_eq!(
            bad.capture("foo", "best", Path::new("x.ts")),
            ExitOutcome::Failure(Some(1))
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_shutdown_kills_running_capture() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("started");
        let script = dir.path().join("slow-streamlink");
        std::fs::write(
            &script,
            format!("#!/bin/sh\ntouch '{}'\nexec sleep 30\n", marker.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        // retried because a concurrent fork can briefly hold the script open
        for _ in 0..5 {
            let shutdown = Arc::new(AtomicBool::new(false));
            let flag = shutdown.clone();
            let watched = marker.clone();
            let stopper = std::thread::spawn(move || {
                for _ in 0..100 {
                    if watched.exists() {
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
                flag.store(true, Ordering::Relaxed);
            });

            let mut capturer = Streamlink::new(script.to_str().unwrap(), shutdown);
            let started = std::time::Instant::now();
            let outcome = capturer.capture("foo", "best", Path::new("x.ts"));
            stopper.join().unwrap();

            if marker.exists() {
                assert_eq!(outcome, ExitOutcome::Failure(None));
                assert!(started.elapsed() < Duration::from_secs(20));
                return;
            }
        }
        panic!("capture script never started");
    }
}
