//! Integration tests for buildx-step

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn step() -> Command {
        let mut cmd = cargo_bin_cmd!("buildx-step");
        cmd.env_remove("PLUGIN_PASSWORD")
            .env_remove("ACCESS_TOKEN")
            .env_remove("PLUGIN_CONFIG")
            .env_remove("BUILDX_STEP_CONFIG");
        cmd
    }

    #[test]
    fn help_displays() {
        step()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("docker buildx"))
            .stdout(predicate::str::contains("--cache-metrics-file"));
    }

    #[test]
    fn help_hides_secret_values() {
        step()
            .arg("--help")
            .env("PLUGIN_PASSWORD", "hunter2")
            .assert()
            .success()
            .stdout(predicate::str::contains("hunter2").not());
    }

    #[test]
    fn version_displays() {
        step()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("buildx-step"));
    }

    #[test]
    fn missing_config_file_fails() {
        let temp = TempDir::new().unwrap();
        step()
            .args(["--config"])
            .arg(temp.path().join("absent.toml"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("Configuration file not found"));
    }

    #[test]
    fn invalid_config_file_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("step.toml");
        std::fs::write(&path, "[build\nrepo = ").unwrap();
        step()
            .arg("--config")
            .arg(&path)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn missing_docker_fails_the_build() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("step.toml");
        std::fs::write(
            &path,
            r#"
[pipeline]
docker_exe = "/nonexistent/docker"
cleanup = false

[daemon]
disabled = true
"#,
        )
        .unwrap();

        step()
            .current_dir(temp.path())
            .env("CI", "true")
            .env("PLUGIN_DAEMON_OFF", "true")
            .arg("--config")
            .arg(&path)
            .args(["--repo", "octo/app"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"));
    }

    #[test]
    fn local_config_is_discovered() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(".buildx-step.toml"), "[build\n").unwrap();
        step()
            .current_dir(temp.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains(".buildx-step.toml"));
    }
}
