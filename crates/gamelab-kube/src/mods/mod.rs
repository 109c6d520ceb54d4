//! Arma 3 workshop mod synchronization
//!
//! For every running game Pod, each configured mod is downloaded with
//! steamcmd and linked as `/opt/arma3/@name`, then the lowercase mirror the
//! links point into is rebuilt.
//!
//! ```text
//! for each component (server, headless-client)
//!   for each running Pod
//!     for each mod:  download (retried) -> link
//!     rebuild mirror: prepare + list -> rename bottom-up
//! ```

pub mod download;
pub mod mirror;

use std::time::Duration;

use gamelab_core::{Arma3, ModSpec};
use tokio::time::sleep;

use crate::error::{KubeError, Result};
use crate::pods::{PodRuntime, RemoteCommand, TargetPod, shell_quote};
use crate::progress::ProgressReporter;
use crate::retry::{RetryPolicy, retry};

pub use download::{DownloadOutcome, classify_download, download_command};
pub use mirror::MirrorPlan;

/// Namespace of the game servers
pub const GAME_NAMESPACE: &str = "arma3";

/// Components running an Arma 3 server, in sync order
pub const COMPONENTS: [&str; 2] = ["server", "headless-client"];

/// Container with steamcmd and the shared Arma 3 volume
pub const STEAMCMD_CONTAINER: &str = "steamcmd";

/// Steam app id of Arma 3
pub const ARMA3_APP_ID: u64 = 107410;

pub const INSTALL_DIR: &str = "/opt/arma3";

/// Where steamcmd stores Arma 3 workshop items
pub fn content_dir() -> String {
    format!("{}/steamapps/workshop/content/{}", INSTALL_DIR, ARMA3_APP_ID)
}

/// Lowercase symlink mirror of [`content_dir`]
pub fn mirror_dir() -> String {
    format!("{}/steamapps/workshop/content_lowercase/{}", INSTALL_DIR, ARMA3_APP_ID)
}

const RESTART_HINT: &str = "Updated Arma 3 mods. Run `kubectl -n arma3 delete pod -l app.kubernetes.io/name=arma3` to reload mods.";

/// Label selector of the Pods of a component
pub fn component_selector(component: &str) -> String {
    format!(
        "app.kubernetes.io/name=arma3,app.kubernetes.io/component={}",
        component
    )
}

/// Shell script replacing the `@name` link of a mod
pub fn link_script(spec: &ModSpec) -> String {
    let link = format!("{}/@{}", INSTALL_DIR, spec.name);
    let target = format!("{}/{}", mirror_dir(), spec.workshop_id);
    format!(
        "rm -f {link} && ln -s {target} {link}",
        link = shell_quote(&link),
        target = shell_quote(&target)
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModSyncOptions {
    /// Pause after Steam reports a rate limit, before the next attempt
    pub rate_limit_cooldown: Duration,
    pub download_policy: RetryPolicy,
}

impl Default for ModSyncOptions {
    fn default() -> Self {
        Self {
            rate_limit_cooldown: Duration::from_secs(5 * 60),
            download_policy: RetryPolicy::mod_download(),
        }
    }
}

/// Drives the mod sync over a [`PodRuntime`]
pub struct ModSync<'a, R: PodRuntime + ?Sized> {
    runtime: &'a R,
    reporter: &'a ProgressReporter,
    options: ModSyncOptions,
}

impl<'a, R: PodRuntime + ?Sized> ModSync<'a, R> {
    pub fn new(runtime: &'a R, reporter: &'a ProgressReporter) -> Self {
        Self {
            runtime,
            reporter,
            options: ModSyncOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ModSyncOptions) -> Self {
        self.options = options;
        self
    }

    /// Sync every configured mod into every running game Pod.
    ///
    /// A download that keeps failing aborts the whole run.
    pub async fn sync(&self, arma3: &Arma3) -> Result<()> {
        if arma3.mods.is_empty() {
            self.reporter.warn("No Arma 3 mods configured, nothing to update");
            return Ok(());
        }

        for component in COMPONENTS {
            self.reporter.step(&format!(
                "Downloading mods for Arma 3 component: {}",
                component
            ));
            let pods = self
                .runtime
                .list_pods(GAME_NAMESPACE, &component_selector(component))
                .await?;
            if pods.is_empty() {
                self.reporter.warn(&format!(
                    "No running Pods for component {}, skipping",
                    component
                ));
                continue;
            }

            for pod in &pods {
                self.sync_pod(pod, arma3).await?;
            }
        }

        self.reporter.success(RESTART_HINT);
        Ok(())
    }

    async fn sync_pod(&self, pod: &TargetPod, arma3: &Arma3) -> Result<()> {
        if !pod.has_container(STEAMCMD_CONTAINER) {
            return Err(KubeError::MissingContainer {
                pod: pod.name.clone(),
                container: STEAMCMD_CONTAINER.to_string(),
            });
        }

        for spec in &arma3.mods {
            self.download(pod, spec).await?;
            self.link(pod, spec).await?;
        }
        self.rebuild_mirror(pod).await
    }

    async fn download(&self, pod: &TargetPod, spec: &ModSpec) -> Result<()> {
        self.reporter.step(&format!(
            "Downloading {} ({}) in volume for Pod {}...",
            spec.name, spec.workshop_id, pod.name
        ));

        let command = download_command(spec);
        let command = &command;
        let runtime = self.runtime;
        let reporter = self.reporter;
        let cooldown = self.options.rate_limit_cooldown;
        let operation = format!("Download of {} ({})", spec.name, spec.workshop_id);

        retry(&self.options.download_policy, &operation, move || async move {
            let result = runtime.exec(pod, STEAMCMD_CONTAINER, command).await?;
            match classify_download(&result.stdout) {
                DownloadOutcome::Downloaded => Ok(()),
                DownloadOutcome::RateLimited => {
                    reporter.warn(&format!(
                        "Steam rate limit exceeded downloading {}, waiting {}s",
                        spec.name,
                        cooldown.as_secs()
                    ));
                    sleep(cooldown).await;
                    Err(KubeError::RateLimited {
                        name: spec.name.clone(),
                        workshop_id: spec.workshop_id,
                    })
                }
                DownloadOutcome::Failed => {
                    reporter.failure(&format!("Download of {} failed", spec.name));
                    Err(KubeError::DownloadFailed {
                        name: spec.name.clone(),
                        workshop_id: spec.workshop_id,
                        output: result.stdout,
                    })
                }
            }
        })
        .await?;

        self.reporter.success(&format!("Downloaded {} ({})", spec.name, spec.workshop_id));
        Ok(())
    }

    async fn link(&self, pod: &TargetPod, spec: &ModSpec) -> Result<()> {
        self.reporter.step(&format!("Linking {} in Pod {}...", spec.name, pod.name));
        self.run_step(
            pod,
            &format!("Linking {}", spec.name),
            &RemoteCommand::shell(link_script(spec)),
        )
        .await
        .map(drop)
    }

    async fn rebuild_mirror(&self, pod: &TargetPod) -> Result<()> {
        self.reporter.step(&format!("Rebuilding lowercase mod mirror in Pod {}...", pod.name));

        let listing = self
            .run_step(
                pod,
                "Preparing mod mirror",
                &RemoteCommand::shell(mirror::prepare_script()),
            )
            .await?;
        let root = mirror_dir();
        let plan = MirrorPlan::from_listing(&root, mirror::parse_listing(&listing, &root));
        tracing::debug!(pod = %pod.name, renames = plan.len(), "computed mirror rename plan");

        if let Some(script) = plan.script() {
            self.run_step(pod, "Renaming mod files", &RemoteCommand::shell(script)).await?;
        }

        self.reporter.success(&format!(
            "Renamed {} mirror entries to lowercase in Pod {}",
            plan.len(),
            pod.name
        ));
        Ok(())
    }

    /// Run a command once; a non-zero exit is fatal
    async fn run_step(&self, pod: &TargetPod, step: &str, command: &RemoteCommand) -> Result<String> {
        let result = self.runtime.exec(pod, STEAMCMD_CONTAINER, command).await?;
        if !result.succeeded {
            self.reporter.failure(&format!("{} failed in Pod {}", step, pod.name));
            return Err(KubeError::CommandFailed {
                pod: pod.name.clone(),
                step: step.to_string(),
                output: result.stdout,
            });
        }
        Ok(result.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCluster;
    use crate::pods::CommandResult;
    use gamelab_core::{Secret, SteamCmd};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn arma3(mods: &[(&str, u64)]) -> Arma3 {
        Arma3 {
            hostname: "Example Arma Server".to_string(),
            admin_password: Secret::new("adminpw"),
            server_password: Secret::new("serverpw"),
            server_command_password: Secret::new("commandpw"),
            steamcmd: SteamCmd {
                username: "exampleuser".to_string(),
                password: Secret::new("steampw"),
            },
            mods: mods
                .iter()
                .map(|(name, workshop_id)| ModSpec {
                    name: name.to_string(),
                    workshop_id: *workshop_id,
                })
                .collect(),
        }
    }

    fn add_game_pod(cluster: &MockCluster, component: &str, name: &str) {
        cluster.add_pod(
            GAME_NAMESPACE,
            &[
                ("app.kubernetes.io/name", "arma3"),
                ("app.kubernetes.io/component", component),
            ],
            name,
            &["arma3", STEAMCMD_CONTAINER],
        );
    }

    fn ok(stdout: &str) -> crate::Result<CommandResult> {
        Ok(CommandResult {
            stdout: stdout.to_string(),
            succeeded: true,
        })
    }

    /// Downloads succeed and the mirror contains one mixed-case file per mod
    fn happy_cluster() -> MockCluster {
        MockCluster::new().on_exec(|_, _, command| {
            let script = command.script();
            if script.starts_with("steamcmd") {
                ok("Success. Downloaded item 1 to \"/opt/arma3/steamapps/workshop/content/107410/1\"")
            } else if script.contains(mirror::LISTING_MARKER) {
                ok(&format!(
                    "{marker}\n{mirror}/1/Addons/CBA.pbo\n{mirror}/1/Addons\n{mirror}/1/mod.cpp\n{mirror}/1\n",
                    marker = mirror::LISTING_MARKER,
                    mirror = mirror_dir()
                ))
            } else {
                ok("")
            }
        })
    }

    #[tokio::test]
    async fn test_sync_sequence() {
        let cluster = happy_cluster();
        add_game_pod(&cluster, "server", "arma3-0");
        add_game_pod(&cluster, "headless-client", "arma3-headless-client-0");
        let reporter = ProgressReporter::captured();

        ModSync::new(&cluster, &reporter)
            .sync(&arma3(&[("cba_a3", 450814997), ("ace", 463939057)]))
            .await
            .unwrap();

        let execs = cluster.execs();
        assert_eq!(execs.len(), 12);
        assert!(execs.iter().all(|e| e.container == STEAMCMD_CONTAINER));
        assert!(execs[..6].iter().all(|e| e.pod == "arma3-0"));
        assert!(execs[6..].iter().all(|e| e.pod == "arma3-headless-client-0"));

        assert!(execs[0].script.contains("+workshop_download_item 107410 450814997"));
        assert!(execs[0].tty);
        assert_eq!(
            execs[1].script,
            "rm -f '/opt/arma3/@cba_a3' && ln -s '/opt/arma3/steamapps/workshop/content_lowercase/107410/450814997' '/opt/arma3/@cba_a3'"
        );
        assert!(!execs[1].tty);
        assert!(execs[2].script.contains("+workshop_download_item 107410 463939057"));
        assert!(execs[3].script.contains("'/opt/arma3/@ace'"));
        assert!(execs[4].script.contains("cp -as"));
        assert_eq!(
            execs[5].script,
            format!(
                "set -e\nrename -f -d 'y/A-Z/a-z/' -- '{m}/1/Addons/CBA.pbo'\nrename -f -d 'y/A-Z/a-z/' -- '{m}/1/Addons'",
                m = mirror_dir()
            )
        );

        let lines = reporter.lines();
        assert_eq!(lines.first().unwrap(), "Downloading mods for Arma 3 component: server");
        assert!(lines.contains(
            &"Downloading cba_a3 (450814997) in volume for Pod arma3-0...".to_string()
        ));
        assert_eq!(lines.last().unwrap(), RESTART_HINT);
        assert!(!lines.iter().any(|l| l.contains("steampw")));
        assert!(!execs.iter().any(|e| e.script.contains("steampw") || e.script.contains("exampleuser")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_cools_down_then_retries() {
        let downloads = Arc::new(AtomicUsize::new(0));
        let counter = downloads.clone();
        let cluster = MockCluster::new().on_exec(move |_, _, command| {
            if command.script().starts_with("steamcmd") {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    ok("FAILED (Rate Limit Exceeded)")
                } else {
                    ok("Success. Downloaded item 1")
                }
            } else {
                ok("")
            }
        });
        add_game_pod(&cluster, "server", "arma3-0");
        let reporter = ProgressReporter::captured();
        let started = tokio::time::Instant::now();

        ModSync::new(&cluster, &reporter)
            .sync(&arma3(&[("cba_a3", 1)]))
            .await
            .unwrap();

        assert_eq!(downloads.load(Ordering::SeqCst), 2);
        assert_eq!(started.elapsed(), Duration::from_secs(5 * 60 + 1));
        assert!(reporter.lines().iter().any(|l| l.contains("rate limit")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_exhaustion_aborts() {
        let cluster = MockCluster::new().on_exec(|_, _, _| ok("Segmentation fault (core dumped)"));
        add_game_pod(&cluster, "server", "arma3-0");
        add_game_pod(&cluster, "headless-client", "arma3-headless-client-0");
        let reporter = ProgressReporter::captured();

        let err = ModSync::new(&cluster, &reporter)
            .sync(&arma3(&[("cba_a3", 1), ("ace", 2)]))
            .await
            .unwrap_err();

        assert_eq!(cluster.counts().execs, 128);
        match err.root() {
            KubeError::DownloadFailed { name, output, .. } => {
                assert_eq!(name, "cba_a3");
                assert!(output.contains("Segmentation fault"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(err, KubeError::RetriesExhausted { attempts: 128, .. }));
        assert!(!reporter.lines().contains(&RESTART_HINT.to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exec_transport_errors_are_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let cluster = MockCluster::new().on_exec(move |pod, container, command| {
            if command.script().starts_with("steamcmd") && counter.fetch_add(1, Ordering::SeqCst) < 2 {
                return Err(KubeError::Exec {
                    pod: pod.name.clone(),
                    container: container.to_string(),
                    message: "connection reset".to_string(),
                });
            }
            ok("Success. Downloaded item 1")
        });
        add_game_pod(&cluster, "server", "arma3-0");
        let reporter = ProgressReporter::captured();

        ModSync::new(&cluster, &reporter)
            .sync(&arma3(&[("cba_a3", 1)]))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_link_failure_is_fatal() {
        let cluster = MockCluster::new().on_exec(|_, _, command| {
            if command.script().starts_with("rm -f") {
                Ok(CommandResult {
                    stdout: "ln: failed to create symbolic link: Read-only file system".to_string(),
                    succeeded: false,
                })
            } else {
                ok("Success. Downloaded item 1")
            }
        });
        add_game_pod(&cluster, "server", "arma3-0");
        let reporter = ProgressReporter::captured();

        let err = ModSync::new(&cluster, &reporter)
            .sync(&arma3(&[("cba_a3", 1)]))
            .await
            .unwrap_err();

        match err {
            KubeError::CommandFailed { pod, step, output } => {
                assert_eq!(pod, "arma3-0");
                assert_eq!(step, "Linking cba_a3");
                assert!(output.contains("Read-only"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(cluster.counts().execs, 2);
    }

    #[tokio::test]
    async fn test_no_mods_configured() {
        let cluster = happy_cluster();
        add_game_pod(&cluster, "server", "arma3-0");
        let reporter = ProgressReporter::captured();

        ModSync::new(&cluster, &reporter).sync(&arma3(&[])).await.unwrap();

        assert_eq!(cluster.counts().lists, 0);
        assert_eq!(cluster.counts().execs, 0);
    }

    #[tokio::test]
    async fn test_component_without_pods_is_skipped() {
        let cluster = happy_cluster();
        add_game_pod(&cluster, "headless-client", "arma3-headless-client-0");
        let reporter = ProgressReporter::captured();

        ModSync::new(&cluster, &reporter)
            .sync(&arma3(&[("cba_a3", 1)]))
            .await
            .unwrap();

        assert_eq!(cluster.counts().lists, 2);
        assert!(cluster.execs().iter().all(|e| e.pod == "arma3-headless-client-0"));
        assert!(reporter.lines().contains(&"No running Pods for component server, skipping".to_string()));
    }

    #[tokio::test]
    async fn test_missing_steamcmd_container() {
        let cluster = happy_cluster();
        cluster.add_pod(
            GAME_NAMESPACE,
            &[
                ("app.kubernetes.io/name", "arma3"),
                ("app.kubernetes.io/component", "server"),
            ],
            "arma3-0",
            &["arma3"],
        );
        let reporter = ProgressReporter::captured();

        let err = ModSync::new(&cluster, &reporter)
            .sync(&arma3(&[("cba_a3", 1)]))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Pod arma3-0 has no container named steamcmd");
        assert_eq!(cluster.counts().execs, 0);
    }

    #[tokio::test]
    async fn test_empty_rename_plan_skips_exec() {
        let cluster = MockCluster::new().on_exec(|_, _, command| {
            if command.script().starts_with("steamcmd") {
                ok("Success. Downloaded item 1")
            } else if command.script().contains(mirror::LISTING_MARKER) {
                ok(&format!("{}\n{}/1/addons/x.pbo\n", mirror::LISTING_MARKER, mirror_dir()))
            } else {
                ok("")
            }
        });
        add_game_pod(&cluster, "server", "arma3-0");
        let reporter = ProgressReporter::captured();

        ModSync::new(&cluster, &reporter)
            .sync(&arma3(&[("cba_a3", 1)]))
            .await
            .unwrap();

        assert_eq!(cluster.counts().execs, 3);
    }

    #[test]
    fn test_workshop_dirs_follow_app_id() {
        assert_eq!(content_dir(), "/opt/arma3/steamapps/workshop/content/107410");
        assert_eq!(mirror_dir(), "/opt/arma3/steamapps/workshop/content_lowercase/107410");
        assert!(content_dir().ends_with(&ARMA3_APP_ID.to_string()));
    }
}
