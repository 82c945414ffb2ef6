use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub const CONFIG: &str = r#"
service_name: svc
service_version: "1.0"
environments:
  - name: prod
    regions:
      - name: us-west-2
        s3_bucket: porter-test-bucket
"#;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn write_config(&self, content: &str) {
        fs::write(self.root.path().join("porter.yaml"), content).unwrap();
    }

    pub fn write_payload(&self, content: &[u8]) {
        let dir = self.root.path().join(".porter-tmp");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("payload.tar"), content).unwrap();
    }

    #[allow(dead_code)]
    pub fn write_file(&self, relative: &str, content: &str) {
        let path = self.root.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::cargo_bin("porter").unwrap();
        cmd.current_dir(self.path())
            .env_remove("PORTER_CONFIG_PATH")
            .env_remove("PORTER_ENV")
            .env_remove("PORTER_REGION")
            .env("XDG_CONFIG_HOME", self.path().join(".config"))
            .env("AWS_EC2_METADATA_DISABLED", "true");
        cmd
    }
}
