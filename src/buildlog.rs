//! # Build Log
//!
//! Every file a module emits is recorded here: which module produced it,
//! from which source, to which destination. The log is the single
//! arbiter of write conflicts: two modules writing the same destination
//! is an error naming both of them.
//!
//! The log persists as XML next to the configuration so later `clean`
//! and `build` runs can reason about a previous build. In extended form
//! each destination also records its modification time and a SHA-256
//! digest; [`BuildLog::compare_outpath`] uses those to classify output
//! files as untouched, locally modified or missing, checking the cheap
//! timestamp first and hashing only when it disagrees.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use sha2::{Digest, Sha256};
use xot::Xot;

use crate::error::{Error, Result};

const FORMAT_VERSION: &str = "2.0";

/// Recorded modification time and content digest of one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileStamp {
    /// mtime in seconds since the epoch, when the file existed.
    pub modified: Option<u64>,
    /// SHA-256 hex digest, when the file existed.
    pub hash: Option<String>,
}

impl FileStamp {
    /// Capture the current state of a path; an absent or unreadable file
    /// records nothing.
    pub fn capture(path: &Path) -> FileStamp {
        if !path.exists() {
            return FileStamp::default();
        }
        let modified = fs::metadata(path)
            .ok()
            .and_then(|metadata| metadata.modified().ok())
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|duration| duration.as_secs());
        let hash = hash_file(path).ok();
        FileStamp { modified, hash }
    }
}

/// One recorded file emission.
#[derive(Debug, Clone)]
pub struct Operation {
    /// Fullname of the emitting module.
    pub module: String,
    /// Absolute base path of the emitting module.
    pub module_path: PathBuf,
    /// Descriptor file that defined the emitting module, if any.
    pub descriptor: Option<PathBuf>,
    /// Absolute source path.
    pub source: PathBuf,
    /// Absolute destination path.
    pub destination: PathBuf,
    pub source_state: FileStamp,
    pub destination_state: FileStamp,
    pub descriptor_state: FileStamp,
    /// Free-form per-operation metadata string sets.
    pub metadata: BTreeMap<String, BTreeSet<String>>,
}

impl Operation {
    pub fn new(
        module: impl Into<String>,
        module_path: impl Into<PathBuf>,
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
    ) -> Operation {
        Operation {
            module: module.into(),
            module_path: module_path.into(),
            descriptor: None,
            source: source.into(),
            destination: destination.into(),
            source_state: FileStamp::default(),
            destination_state: FileStamp::default(),
            descriptor_state: FileStamp::default(),
            metadata: BTreeMap::new(),
        }
    }

    /// Capture mtime and digest of every path this operation touches.
    pub fn capture_state(&mut self) {
        self.source_state = FileStamp::capture(&self.source);
        self.destination_state = FileStamp::capture(&self.destination);
        if let Some(descriptor) = &self.descriptor {
            self.descriptor_state = FileStamp::capture(descriptor);
        }
    }

    /// Source path relative to the module base, absolute as fallback.
    pub fn local_source(&self) -> &Path {
        self.source
            .strip_prefix(&self.module_path)
            .unwrap_or(&self.source)
    }

    /// Destination path relative to the given output path.
    pub fn local_destination(&self, outpath: &Path) -> &Path {
        self.destination
            .strip_prefix(outpath)
            .unwrap_or(&self.destination)
    }
}

/// Classification of a previously built destination file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Unmodified,
    Modified,
    Missing,
    /// The log carries no recorded state for this file.
    Unknown,
}

/// The record of one build.
#[derive(Debug)]
pub struct BuildLog {
    outpath: PathBuf,
    operations: Vec<Operation>,
    /// destination -> emitting module, for conflict detection
    producers: HashMap<PathBuf, String>,
    /// free-form key/value metadata contributed during the build
    pub metadata: BTreeMap<String, BTreeSet<String>>,
}

impl BuildLog {
    pub fn new(outpath: impl Into<PathBuf>) -> Self {
        BuildLog {
            outpath: outpath.into(),
            operations: Vec::new(),
            producers: HashMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn outpath(&self) -> &Path {
        &self.outpath
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// All emitting modules, sorted and deduplicated.
    pub fn modules(&self) -> Vec<&str> {
        let mut modules: Vec<&str> = self
            .operations
            .iter()
            .map(|operation| operation.module.as_str())
            .collect();
        modules.sort_unstable();
        modules.dedup();
        modules
    }

    pub fn operations_per_module(&self, module: &str) -> Vec<&Operation> {
        self.operations
            .iter()
            .filter(|operation| operation.module == module)
            .collect()
    }

    pub fn add_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata
            .entry(key.into())
            .or_default()
            .insert(value.into());
    }

    /// Record an emission, rejecting destination conflicts.
    ///
    /// The mtime and digest of every involved path are captured where the
    /// file exists, so simulated builds log cleanly without touching
    /// disk.
    pub fn log(
        &mut self,
        module: &str,
        module_path: &Path,
        descriptor: Option<&Path>,
        source: &Path,
        destination: &Path,
    ) -> Result<()> {
        if let Some(previous) = self.producers.get(destination) {
            if previous != module {
                return Err(Error::OverwritingFile {
                    module: module.to_string(),
                    path: destination.display().to_string(),
                    previous: previous.clone(),
                });
            }
        }
        let mut operation = Operation::new(module, module_path, source, destination);
        operation.descriptor = descriptor.map(Path::to_path_buf);
        operation.capture_state();
        self.log_unsafe(operation);
        Ok(())
    }

    /// Record an operation without conflict checking.
    pub fn log_unsafe(&mut self, operation: Operation) {
        self.producers
            .insert(operation.destination.clone(), operation.module.clone());
        self.operations.push(operation);
    }

    /// Classify every logged destination against the filesystem.
    pub fn compare_outpath(&self) -> Vec<(PathBuf, FileState)> {
        self.operations
            .iter()
            .map(|operation| {
                let state = compare_operation(operation);
                (operation.destination.clone(), state)
            })
            .collect()
    }

    /// Serialize to XML, with paths relative to `base`. Extended mode
    /// additionally records the mtime and digest of every involved path.
    pub fn to_xml(&self, base: &Path, extended: bool) -> Result<String> {
        let mut xot = Xot::new();
        let document = xot.parse("<buildlog/>").map_err(xml_error)?;
        let buildlog = xot.document_element(document).map_err(xml_error)?;

        let version_name = xot.add_name("version");
        let outpath_name = xot.add_name("outpath");
        let operation_name = xot.add_name("operation");
        let module_name = xot.add_name("module");
        let name_attr = xot.add_name("name");
        let descriptor_name = xot.add_name("descriptor");
        let source_name = xot.add_name("source");
        let destination_name = xot.add_name("destination");
        let modified_attr = xot.add_name("modified");
        let hash_attr = xot.add_name("hash");

        let version = xot.new_element(version_name);
        xot.append(buildlog, version).map_err(xml_error)?;
        let text = xot.new_text(FORMAT_VERSION);
        xot.append(version, text).map_err(xml_error)?;

        let outpath = xot.new_element(outpath_name);
        xot.append(buildlog, outpath).map_err(xml_error)?;
        let text = xot.new_text(&path_string(&self.outpath, base));
        xot.append(outpath, text).map_err(xml_error)?;

        // stable output regardless of build scheduling
        let mut operations: Vec<&Operation> = self.operations.iter().collect();
        operations.sort_by(|a, b| {
            (&a.module, &a.source, &a.destination).cmp(&(&b.module, &b.source, &b.destination))
        });

        let stamp = |xot: &mut Xot, element: xot::Node, state: &FileStamp| {
            if let Some(modified) = state.modified {
                xot.attributes_mut(element)
                    .insert(modified_attr, modified.to_string());
            }
            if let Some(hash) = &state.hash {
                xot.attributes_mut(element).insert(hash_attr, hash.clone());
            }
        };

        for record in operations {
            let operation = xot.new_element(operation_name);
            xot.append(buildlog, operation).map_err(xml_error)?;

            let module = xot.new_element(module_name);
            xot.attributes_mut(module)
                .insert(name_attr, record.module.clone());
            xot.append(operation, module).map_err(xml_error)?;
            let text = xot.new_text(&path_string(&record.module_path, base));
            xot.append(module, text).map_err(xml_error)?;

            if let Some(path) = &record.descriptor {
                let descriptor = xot.new_element(descriptor_name);
                if extended {
                    stamp(&mut xot, descriptor, &record.descriptor_state);
                }
                xot.append(operation, descriptor).map_err(xml_error)?;
                let text = xot.new_text(&path_string(path, base));
                xot.append(descriptor, text).map_err(xml_error)?;
            }

            let source = xot.new_element(source_name);
            if extended {
                stamp(&mut xot, source, &record.source_state);
            }
            xot.append(operation, source).map_err(xml_error)?;
            let text = xot.new_text(&path_string(&record.source, base));
            xot.append(source, text).map_err(xml_error)?;

            let destination = xot.new_element(destination_name);
            if extended {
                stamp(&mut xot, destination, &record.destination_state);
            }
            xot.append(operation, destination).map_err(xml_error)?;
            let text = xot.new_text(&path_string(&record.destination, base));
            xot.append(destination, text).map_err(xml_error)?;
        }

        xot.to_string(document).map_err(xml_error)
    }

    /// Parse a previously serialized log, resolving paths against `base`.
    pub fn from_xml(content: &str, base: &Path) -> Result<BuildLog> {
        let mut xot = Xot::new();
        let document = xot
            .parse(content)
            .map_err(|error| Error::BuildLogFormat {
                message: format!("invalid XML: {error}"),
            })?;
        let buildlog = xot.document_element(document).map_err(xml_error)?;

        let version_name = xot.add_name("version");
        let outpath_name = xot.add_name("outpath");
        let operation_name = xot.add_name("operation");
        let module_name = xot.add_name("module");
        let name_attr = xot.add_name("name");
        let descriptor_name = xot.add_name("descriptor");
        let source_name = xot.add_name("source");
        let destination_name = xot.add_name("destination");
        let modified_attr = xot.add_name("modified");
        let hash_attr = xot.add_name("hash");

        let stamp = |xot: &Xot, element: xot::Node| FileStamp {
            modified: xot
                .attributes(element)
                .get(modified_attr)
                .and_then(|value| value.parse().ok()),
            hash: xot.attributes(element).get(hash_attr).cloned(),
        };

        let mut version = None;
        let mut outpath = None;
        let mut operations = Vec::new();
        for child in xot.children(buildlog) {
            let Some(element) = xot.element(child) else {
                continue;
            };
            if element.name() == version_name {
                version = Some(element_text(&xot, child));
            } else if element.name() == outpath_name {
                outpath = Some(base.join(element_text(&xot, child)));
            } else if element.name() == operation_name {
                let mut module = None;
                let mut module_path = None;
                let mut descriptor = None;
                let mut descriptor_state = FileStamp::default();
                let mut source = None;
                let mut source_state = FileStamp::default();
                let mut destination = None;
                let mut destination_state = FileStamp::default();
                for field in xot.children(child) {
                    let Some(element) = xot.element(field) else {
                        continue;
                    };
                    if element.name() == module_name {
                        module = xot.attributes(field).get(name_attr).cloned();
                        module_path = Some(base.join(element_text(&xot, field)));
                    } else if element.name() == descriptor_name {
                        descriptor_state = stamp(&xot, field);
                        descriptor = Some(base.join(element_text(&xot, field)));
                    } else if element.name() == source_name {
                        source_state = stamp(&xot, field);
                        source = Some(base.join(element_text(&xot, field)));
                    } else if element.name() == destination_name {
                        destination_state = stamp(&xot, field);
                        destination = Some(base.join(element_text(&xot, field)));
                    }
                }
                let (Some(module), Some(module_path), Some(source), Some(destination)) =
                    (module, module_path, source, destination)
                else {
                    return Err(Error::BuildLogFormat {
                        message: "operation entry is missing module, source or destination"
                            .to_string(),
                    });
                };
                let mut operation = Operation::new(module, module_path, source, destination);
                operation.descriptor = descriptor;
                operation.descriptor_state = descriptor_state;
                operation.source_state = source_state;
                operation.destination_state = destination_state;
                operations.push(operation);
            }
        }

        match version {
            Some(found) if found == FORMAT_VERSION => {}
            Some(found) => {
                return Err(Error::BuildLogFormat {
                    message: format!(
                        "unsupported build log version '{found}', expected '{FORMAT_VERSION}'"
                    ),
                });
            }
            None => {
                return Err(Error::BuildLogFormat {
                    message: "build log is missing its version tag".to_string(),
                });
            }
        }

        let outpath = outpath.ok_or_else(|| Error::BuildLogFormat {
            message: "build log is missing its outpath".to_string(),
        })?;
        let mut log = BuildLog::new(outpath);
        for operation in operations {
            log.log_unsafe(operation);
        }
        Ok(log)
    }
}

fn compare_operation(operation: &Operation) -> FileState {
    let Ok(metadata) = fs::metadata(&operation.destination) else {
        return FileState::Missing;
    };
    let state = &operation.destination_state;
    let (Some(recorded_mtime), Some(recorded_hash)) = (state.modified, &state.hash) else {
        return FileState::Unknown;
    };
    let current_mtime = metadata
        .modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|duration| duration.as_secs());
    if current_mtime == Some(recorded_mtime) {
        return FileState::Unmodified;
    }
    // timestamp changed, the content decides
    match hash_file(&operation.destination) {
        Ok(current_hash) if current_hash == *recorded_hash => FileState::Unmodified,
        Ok(_) => FileState::Modified,
        Err(_) => FileState::Missing,
    }
}

fn hash_file(path: &Path) -> std::io::Result<String> {
    let content = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&content);
    Ok(hex::encode(hasher.finalize()))
}

fn path_string(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

fn element_text(xot: &Xot, node: xot::Node) -> String {
    xot.text_content_str(node).unwrap_or_default().to_string()
}

fn xml_error(error: impl std::fmt::Display) -> Error {
    Error::BuildLogFormat {
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn operation(module: &str, destination: &Path) -> Operation {
        Operation::new(module, "/repo", "/repo/template.in", destination)
    }

    #[test]
    fn test_conflicting_destinations_name_both_modules() {
        let mut log = BuildLog::new("/out");
        log.log(
            "repo:a",
            Path::new("/repo/a"),
            None,
            Path::new("/repo/a/f.in"),
            Path::new("/out/f"),
        )
        .unwrap();

        let error = log
            .log(
                "repo:b",
                Path::new("/repo/b"),
                None,
                Path::new("/repo/b/f.in"),
                Path::new("/out/f"),
            )
            .unwrap_err();
        match error {
            Error::OverwritingFile {
                module, previous, ..
            } => {
                assert_eq!(module, "repo:b");
                assert_eq!(previous, "repo:a");
            }
            other => panic!("expected overwrite error, got {other:?}"),
        }
    }

    #[test]
    fn test_same_module_may_rewrite_its_own_file() {
        let mut log = BuildLog::new("/out");
        for _ in 0..2 {
            log.log(
                "repo:a",
                Path::new("/repo/a"),
                None,
                Path::new("/repo/a/f.in"),
                Path::new("/out/f"),
            )
            .unwrap();
        }
        assert_eq!(log.operations().len(), 2);
    }

    #[test]
    fn test_local_paths() {
        let op = Operation::new("repo:a", "/repo/a", "/repo/a/src/f.in", "/out/src/f");
        assert_eq!(op.local_source(), Path::new("src/f.in"));
        assert_eq!(op.local_destination(Path::new("/out")), Path::new("src/f"));
    }

    #[test]
    fn test_xml_round_trip() {
        let base = Path::new("/project");
        let mut log = BuildLog::new("/project/out");
        log.log(
            "repo:uart",
            Path::new("/project/repo/uart"),
            Some(Path::new("/project/repo/uart/module.yaml")),
            Path::new("/project/repo/uart/uart.c.in"),
            Path::new("/project/out/uart.c"),
        )
        .unwrap();
        log.log(
            "repo:spi",
            Path::new("/project/repo/spi"),
            None,
            Path::new("/project/repo/spi/spi.c.in"),
            Path::new("/project/out/spi.c"),
        )
        .unwrap();

        let xml = log.to_xml(base, false).unwrap();
        assert!(xml.contains("<version>2.0</version>"));
        let parsed = BuildLog::from_xml(&xml, base).unwrap();

        assert_eq!(parsed.outpath(), Path::new("/project/out"));
        assert_eq!(parsed.operations().len(), 2);
        assert_eq!(parsed.modules(), vec!["repo:spi", "repo:uart"]);
        let ops = parsed.operations_per_module("repo:uart");
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].source, Path::new("/project/repo/uart/uart.c.in"));
        assert_eq!(ops[0].destination, Path::new("/project/out/uart.c"));
        assert_eq!(
            ops[0].descriptor.as_deref(),
            Some(Path::new("/project/repo/uart/module.yaml"))
        );
        assert!(parsed.operations_per_module("repo:spi")[0]
            .descriptor
            .is_none());
    }

    #[test]
    fn test_extended_xml_keeps_file_state() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("generated.c.in");
        fs::write(&source, "template").unwrap();
        let descriptor = dir.path().join("module.yaml");
        fs::write(&descriptor, "module:\n  name: a\n").unwrap();
        let destination = dir.path().join("generated.c");
        fs::write(&destination, "content").unwrap();

        let mut log = BuildLog::new(dir.path());
        log.log("repo:a", dir.path(), Some(&descriptor), &source, &destination)
            .unwrap();

        let xml = log.to_xml(dir.path(), true).unwrap();
        let parsed = BuildLog::from_xml(&xml, dir.path()).unwrap();
        let op = &parsed.operations()[0];
        assert!(op.destination_state.modified.is_some());
        assert_eq!(
            op.destination_state.hash.as_deref(),
            Some(hash_file(&destination).unwrap().as_str())
        );
        assert_eq!(
            op.source_state.hash.as_deref(),
            Some(hash_file(&source).unwrap().as_str())
        );
        assert_eq!(
            op.descriptor_state.hash.as_deref(),
            Some(hash_file(&descriptor).unwrap().as_str())
        );
    }

    #[test]
    fn test_plain_xml_drops_file_state() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("generated.c");
        fs::write(&destination, "content").unwrap();

        let mut log = BuildLog::new(dir.path());
        log.log(
            "repo:a",
            dir.path(),
            None,
            &dir.path().join("generated.c.in"),
            &destination,
        )
        .unwrap();

        let xml = log.to_xml(dir.path(), false).unwrap();
        let parsed = BuildLog::from_xml(&xml, dir.path()).unwrap();
        assert_eq!(parsed.operations()[0].destination_state, FileStamp::default());
    }

    #[test]
    fn test_rejects_wrong_version() {
        let xml = r#"<buildlog><version>1.0</version><outpath>out</outpath></buildlog>"#;
        let error = BuildLog::from_xml(xml, Path::new("/")).unwrap_err();
        assert!(matches!(error, Error::BuildLogFormat { .. }));
    }

    #[test]
    fn test_rejects_missing_version_tag() {
        let xml = r#"<buildlog version="2.0"><outpath>out</outpath></buildlog>"#;
        let error = BuildLog::from_xml(xml, Path::new("/")).unwrap_err();
        assert!(error.to_string().contains("version"));
    }

    #[test]
    fn test_rejects_incomplete_operation() {
        let xml = r#"<buildlog>
            <version>2.0</version>
            <outpath>out</outpath>
            <operation><source>f.in</source></operation>
        </buildlog>"#;
        let error = BuildLog::from_xml(xml, Path::new("/")).unwrap_err();
        assert!(matches!(error, Error::BuildLogFormat { .. }));
    }

    #[test]
    fn test_compare_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = BuildLog::new(dir.path());
        let mut op = operation("repo:a", &dir.path().join("gone.c"));
        op.destination_state = FileStamp {
            modified: Some(0),
            hash: Some("00".to_string()),
        };
        log.log_unsafe(op);

        let states = log.compare_outpath();
        assert_eq!(states[0].1, FileState::Missing);
    }

    #[test]
    fn test_compare_hash_overrules_stale_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("f.c");
        let mut file = fs::File::create(&destination).unwrap();
        file.write_all(b"original").unwrap();
        drop(file);

        let mut log = BuildLog::new(dir.path());
        let mut op = operation("repo:a", &destination);
        // ancient timestamp forces the hash comparison
        op.destination_state = FileStamp {
            modified: Some(0),
            hash: Some(hash_file(&destination).unwrap()),
        };
        log.log_unsafe(op);
        assert_eq!(log.compare_outpath()[0].1, FileState::Unmodified);

        fs::write(&destination, "edited by hand").unwrap();
        assert_eq!(log.compare_outpath()[0].1, FileState::Modified);
    }

    #[test]
    fn test_compare_without_recorded_state() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("f.c");
        fs::write(&destination, "content").unwrap();

        let mut log = BuildLog::new(dir.path());
        log.log_unsafe(operation("repo:a", &destination));
        assert_eq!(log.compare_outpath()[0].1, FileState::Unknown);
    }

    #[test]
    fn test_fresh_build_compares_unmodified() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("f.c");
        fs::write(&destination, "content").unwrap();

        let mut log = BuildLog::new(dir.path());
        log.log(
            "repo:a",
            dir.path(),
            None,
            &dir.path().join("f.c.in"),
            &destination,
        )
        .unwrap();
        assert_eq!(log.compare_outpath()[0].1, FileState::Unmodified);
    }

    #[test]
    fn test_metadata_is_deduplicated_and_sorted() {
        let mut log = BuildLog::new("/out");
        log.add_metadata("flags", "-Wall");
        log.add_metadata("flags", "-Os");
        log.add_metadata("flags", "-Wall");
        let flags = &log.metadata["flags"];
        assert_eq!(
            flags.iter().collect::<Vec<_>>(),
            vec![&"-Os".to_string(), &"-Wall".to_string()]
        );
    }
}
