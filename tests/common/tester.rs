use std::{
    fs,
    path::{Path, PathBuf},
};

use super::test_subscriber::MemorySubscriber;
use batchup::{command::Command, Config, Error, Interrupt};
use rand::RngCore;

/// A temporary directory holding a source tree, a backup directory, and a rules file.
///
/// The temporary directory itself is the configured root, so `<temp>/source/a.txt` is
/// backed up to `<temp>/backup/source/a.txt`.
pub struct Tester {
    temp_dir: tempfile::TempDir,
    root: PathBuf,
    subscriber: MemorySubscriber,
}

impl Tester {
    pub fn new(rules: &str) -> Self {
        Self::with_verbosity(rules, 2)
    }

    pub fn with_verbosity(rules: &str, verbosity: u8) -> Self {
        let temp_dir = tempfile::tempdir().expect("failed to create temporary directory");
        let root = batchup::paths::absolute(temp_dir.path()).expect("temp dir should be absolute");
        fs::create_dir_all(root.join("source")).expect("failed to create source directory");

        let tester = Self {
            temp_dir,
            root,
            subscriber: MemorySubscriber::new(verbosity),
        };
        tester.write_rules(rules);
        tester
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source_dir(&self) -> PathBuf {
        self.root.join("source")
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.root.join("backup")
    }

    pub fn rules_file(&self) -> PathBuf {
        self.root.join("rules.txt")
    }

    /// Write the rules file, replacing `{source}` and `{root}` with their paths.
    pub fn write_rules(&self, rules: &str) {
        let rules = rules
            .replace("{source}", &self.source_dir().to_string_lossy())
            .replace("{root}", &self.root.to_string_lossy());
        fs::write(self.rules_file(), rules).expect("failed to write rules file");
    }

    pub fn config(&self) -> Config {
        Config::new(self.rules_file(), self.backup_dir()).with_root(&self.root)
    }

    /// Path of `relative` inside the source tree.
    pub fn source(&self, relative: &str) -> PathBuf {
        self.source_dir().join(relative)
    }

    /// Where `relative` inside the source tree is backed up to.
    pub fn backup(&self, relative: &str) -> PathBuf {
        self.backup_dir().join("source").join(relative)
    }

    /// Create a file with random content inside the source tree and return its content.
    pub fn create_file(&self, relative: &str) -> Vec<u8> {
        let mut content = vec![0; 64];
        rand::thread_rng().fill_bytes(&mut content);
        let path = self.source(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent directories");
        }
        fs::write(&path, &content).expect("failed to write source file");
        content
    }

    pub fn run(&self, config: &Config) -> Result<(), Error> {
        batchup::run(config, &Interrupt::new())
    }

    pub fn backup_now(&self) {
        self.run(&self.config()).expect("backup should succeed");
    }

    /// The orphans reported for the current rules, in output order.
    pub fn orphans(&self) -> Vec<PathBuf> {
        let mut out = Vec::new();
        Command::Orphans
            .run_with_output(&self.config(), &Interrupt::new(), &mut out)
            .expect("listing orphans should succeed");
        String::from_utf8(out)
            .expect("orphan list should be utf-8")
            .lines()
            .map(PathBuf::from)
            .collect()
    }

    pub fn output(&self) -> String {
        self.subscriber.output()
    }

    pub fn clear_output(&self) {
        self.subscriber.clear();
    }

    pub fn assert_has_output(&self, expected: &str) {
        let output = self.output();
        assert!(
            output.contains(expected),
            "expected \"{}\" in output\n{}",
            expected,
            output
        );
    }

    pub fn assert_not_has_output(&self, unexpected: &str) {
        let output = self.output();
        assert!(
            !output.contains(unexpected),
            "did not expect \"{}\" in output\n{}",
            unexpected,
            output
        );
    }

    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }
}
