use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Parses the POSIX flags the relay passes and exposes `$repo`, `$cfg`,
/// `$tag`, `$pre` and `$nobackup` to the script body.
const ARG_PARSER: &str = r#"repo=""; cfg=""; tag=""; pre=0; nobackup=0
while [ $# -gt 0 ]; do
  case "$1" in
    --repository) repo="$2"; shift ;;
    --config) cfg="$2"; shift ;;
    --tag) tag="$2"; shift ;;
    --allow-prerelease) pre=1 ;;
    --no-backup) nobackup=1 ;;
  esac
  shift
done
"#;

/// A local root tree with a generated `update-from-github.sh`.
pub struct RelayRoot {
    pub dir: TempDir,
}

impl RelayRoot {
    pub fn with_script(body: &str) -> Self {
        crate::test_log!("FIXTURE: Creating relay root");

        let dir = TempDir::new().expect("Failed to create temp dir");
        let scripts = dir.path().join("addon").join("scripts");
        fs::create_dir_all(&scripts).expect("Failed to create scripts dir");
        fs::create_dir_all(dir.path().join("config").join("data"))
            .expect("Failed to create config data dir");

        fs::write(
            scripts.join("update-from-github.sh"),
            format!("{ARG_PARSER}{body}\n"),
        )
        .expect("Failed to write script");

        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn path_str(&self) -> &str {
        self.dir.path().to_str().expect("temp dir is not UTF-8")
    }

    pub fn state_file(&self) -> PathBuf {
        self.path()
            .join("config")
            .join("data")
            .join("grocy-addon-state.json")
    }
}
