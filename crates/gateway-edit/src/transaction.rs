use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use lsp_types::{DocumentChangeOperation, OneOf, ResourceOp, TextEdit, Url, WorkspaceEdit};

use crate::canonical::canonicalize_edit;
use crate::locks::UriLocks;
use crate::{Error, Result};

const PREVIEW_BYTES: usize = 97;

#[derive(Debug, Clone, Copy)]
pub struct ApplyOptions {
    pub atomic: bool,
    pub dry_run: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        ApplyOptions { atomic: true, dry_run: false }
    }
}

#[derive(Debug, Clone)]
pub struct FileChange {
    pub uri: String,
    pub edits_applied: usize,
    pub preview: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ApplyResult {
    pub success: bool,
    pub transaction_id: Option<String>,
    pub files_modified: Vec<String>,
    pub total_changes: usize,
    pub changes: Vec<FileChange>,
    pub rollback_performed: bool,
    pub rollback_incomplete: Option<String>,
}

/// A file whose final content was computed by zero or more `TextEdit`s
/// applied to (or, for a bare create, in place of) its original bytes.
struct PlannedWrite {
    uri: Url,
    path: PathBuf,
    original: Option<Vec<u8>>,
    new_contents: String,
    edits_applied: usize,
}

struct PlannedRename {
    from_uri: Url,
    to_uri: Url,
    from: PathBuf,
    to: PathBuf,
    overwritten: Option<Vec<u8>>,
}

struct PlannedDelete {
    uri: Url,
    path: PathBuf,
    original: Vec<u8>,
    is_dir: bool,
}

struct Plan {
    writes: Vec<PlannedWrite>,
    creates: Vec<PlannedWrite>,
    renames: Vec<PlannedRename>,
    deletes: Vec<PlannedDelete>,
}

enum Completed {
    Write { path: PathBuf, original: Option<Vec<u8>> },
    Create { path: PathBuf, overwritten: Option<Vec<u8>> },
    Rename { from: PathBuf, to: PathBuf },
    Delete { path: PathBuf, contents: Vec<u8>, is_dir: bool },
}

/// Applies `WorkspaceEdit` values against one workspace's filesystem.
/// One instance is shared across a workspace's lifetime so its
/// per-URI locks serialize concurrent transactions touching the same files.
pub struct TransactionManager {
    workspace_root: PathBuf,
    locks: UriLocks,
    tx_counter: AtomicU64,
}

impl TransactionManager {
    pub fn new(workspace_root: PathBuf) -> Self {
        TransactionManager {
            workspace_root,
            locks: UriLocks::new(),
            tx_counter: AtomicU64::new(1),
        }
    }

    fn validate_path(&self, uri: &Url) -> Result<PathBuf> {
        let path = gateway_stdx::uri::uri_to_file_path(uri)
            .map_err(|err| Error::PathEscape(err.to_string()))?;
        let resolved = gateway_stdx::path::canonicalize(&path, &self.workspace_root);
        if !gateway_stdx::path::is_within(&self.workspace_root, &resolved) {
            return Err(Error::PathEscape(format!(
                "{} escapes workspace root {}",
                path.display(),
                self.workspace_root.display()
            )));
        }
        Ok(path)
    }

    pub async fn apply(&self, edit: &WorkspaceEdit, options: ApplyOptions) -> Result<ApplyResult> {
        let ops = canonicalize_edit(edit)?;
        let touched = Self::touched_uris(&ops);
        let _guards = self.locks.acquire_sorted(&touched).await;

        let tx_id = format!("tx-{}", self.tx_counter.fetch_add(1, Ordering::SeqCst));
        let plan = self.build_plan(&ops)?;

        if options.dry_run {
            return Ok(Self::dry_run_result(&plan));
        }

        Ok(self.commit(plan, options.atomic, tx_id))
    }

    fn touched_uris(ops: &[DocumentChangeOperation]) -> Vec<String> {
        let mut uris = Vec::new();
        for op in ops {
            match op {
                DocumentChangeOperation::Edit(e) => uris.push(e.text_document.uri.to_string()),
                DocumentChangeOperation::Op(ResourceOp::Create(c)) => uris.push(c.uri.to_string()),
                DocumentChangeOperation::Op(ResourceOp::Delete(d)) => uris.push(d.uri.to_string()),
                DocumentChangeOperation::Op(ResourceOp::Rename(r)) => {
                    uris.push(r.old_uri.to_string());
                    uris.push(r.new_uri.to_string());
                }
            }
        }
        uris
    }

    /// Resolves every operation against the current (and in-progress,
    /// in-transaction) filesystem state without performing any mutation.
    fn build_plan(&self, ops: &[DocumentChangeOperation]) -> Result<Plan> {
        let mut pending: HashMap<Url, (PathBuf, Option<Vec<u8>>, String, usize)> = HashMap::new();
        let mut creates = Vec::new();
        let mut renames = Vec::new();
        let mut deletes = Vec::new();

        for op in ops {
            match op {
                DocumentChangeOperation::Edit(document_edit) => {
                    let uri = document_edit.text_document.uri.clone();
                    let path = self.validate_path(&uri)?;
                    let entry = match pending.remove(&uri) {
                        Some(entry) => entry,
                        None => {
                            let original = read_optional(&path)?;
                            let text = match &original {
                                Some(bytes) => String::from_utf8(bytes.clone()).map_err(|_| {
                                    Error::InvalidEdit(format!("{} is not valid UTF-8", path.display()))
                                })?,
                                None => {
                                    return Err(Error::InvalidEdit(format!(
                                        "cannot edit {}: file does not exist and is not being created in this transaction",
                                        uri
                                    )))
                                }
                            };
                            (path, original, text, 0)
                        }
                    };
                    let (path, original, text, applied) = entry;
                    let edits: Vec<TextEdit> = document_edit
                        .edits
                        .iter()
                        .map(|e| match e {
                            OneOf::Left(edit) => edit.clone(),
                            OneOf::Right(annotated) => annotated.text_edit.clone(),
                        })
                        .collect();
                    let new_text = apply_text_edits(&text, &edits);
                    pending.insert(uri, (path, original, new_text, applied + edits.len()));
                }
                DocumentChangeOperation::Op(ResourceOp::Create(create)) => {
                    let uri = create.uri.clone();
                    let path = self.validate_path(&uri)?;
                    let overwrite = create.options.as_ref().and_then(|o| o.overwrite).unwrap_or(false);
                    let ignore_if_exists = create
                        .options
                        .as_ref()
                        .and_then(|o| o.ignore_if_exists)
                        .unwrap_or(false)
                        && !overwrite;
                    let exists = path.exists();
                    if exists && ignore_if_exists {
                        continue;
                    }
                    if exists && !overwrite {
                        return Err(Error::InvalidEdit(format!(
                            "create target already exists: {}",
                            path.display()
                        )));
                    }
                    if !pending.contains_key(&uri) {
                        let original = if exists { read_optional(&path)? } else { None };
                        pending.insert(uri.clone(), (path, original, String::new(), 0));
                    }
                }
                DocumentChangeOperation::Op(ResourceOp::Rename(rename)) => {
                    let from_uri = rename.old_uri.clone();
                    let to_uri = rename.new_uri.clone();
                    let from = self.validate_path(&from_uri)?;
                    let to = self.validate_path(&to_uri)?;
                    let overwrite = rename.options.as_ref().and_then(|o| o.overwrite).unwrap_or(false);
                    let ignore_if_exists = rename
                        .options
                        .as_ref()
                        .and_then(|o| o.ignore_if_exists)
                        .unwrap_or(false)
                        && !overwrite;
                    if to.exists() && ignore_if_exists {
                        continue;
                    }
                    if to.exists() && !overwrite {
                        return Err(Error::InvalidEdit(format!(
                            "rename target already exists: {}",
                            to.display()
                        )));
                    }
                    let overwritten = if to.exists() { read_optional(&to)? } else { None };
                    if let Some(entry) = pending.remove(&from_uri) {
                        pending.insert(to_uri.clone(), entry);
                    }
                    renames.push(PlannedRename { from_uri, to_uri, from, to, overwritten });
                }
                DocumentChangeOperation::Op(ResourceOp::Delete(delete)) => {
                    let uri = delete.uri.clone();
                    let path = self.validate_path(&uri)?;
                    let recursive = delete.options.as_ref().and_then(|o| o.recursive).unwrap_or(false);
                    let ignore_if_not_exists = delete
                        .options
                        .as_ref()
                        .and_then(|o| o.ignore_if_not_exists)
                        .unwrap_or(false);
                    let is_dir = path.is_dir();
                    if !path.exists() {
                        if ignore_if_not_exists {
                            continue;
                        }
                        return Err(Error::InvalidEdit(format!(
                            "delete target does not exist: {}",
                            path.display()
                        )));
                    }
                    if is_dir && !recursive {
                        return Err(Error::InvalidEdit(format!(
                            "delete target is a non-empty directory and recursive was not set: {}",
                            path.display()
                        )));
                    }
                    let original = if is_dir { Vec::new() } else { std::fs::read(&path)? };
                    deletes.push(PlannedDelete { uri, path, original, is_dir });
                }
            }
        }

        let (writes, pure_creates): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .map(|(uri, (path, original, new_contents, edits_applied))| PlannedWrite {
                uri,
                path,
                original,
                new_contents,
                edits_applied,
            })
            .partition(|w| w.edits_applied > 0 || w.original.is_some());
        creates.extend(pure_creates);

        Ok(Plan { writes, creates, renames, deletes })
    }

    fn dry_run_result(plan: &Plan) -> ApplyResult {
        let mut changes = Vec::new();
        for write in &plan.writes {
            changes.push(FileChange {
                uri: write.uri.to_string(),
                edits_applied: write.edits_applied,
                preview: Some(preview(&write.new_contents)),
            });
        }
        for create in &plan.creates {
            changes.push(FileChange {
                uri: create.uri.to_string(),
                edits_applied: 0,
                preview: Some(preview(&create.new_contents)),
            });
        }
        for rename in &plan.renames {
            changes.push(FileChange {
                uri: format!("{} -> {}", rename.from_uri, rename.to_uri),
                edits_applied: 0,
                preview: None,
            });
        }
        for delete in &plan.deletes {
            changes.push(FileChange { uri: delete.uri.to_string(), edits_applied: 0, preview: None });
        }

        let files_modified = changes.iter().map(|c| c.uri.clone()).collect();
        let total_changes = plan.writes.iter().map(|w| w.edits_applied.max(1)).sum::<usize>()
            + plan.creates.len()
            + plan.renames.len()
            + plan.deletes.len();

        ApplyResult {
            success: true,
            transaction_id: None,
            files_modified,
            total_changes,
            changes,
            rollback_performed: false,
            rollback_incomplete: None,
        }
    }

    fn commit(&self, plan: Plan, atomic: bool, tx_id: String) -> ApplyResult {
        let mut completed: Vec<Completed> = Vec::new();
        let mut changes = Vec::new();
        let mut files_modified = Vec::new();

        let result = (|| -> Result<()> {
            for write in &plan.writes {
                atomic_write(&write.path, write.new_contents.as_bytes(), &tx_id)?;
                completed.push(Completed::Write {
                    path: write.path.clone(),
                    original: write.original.clone(),
                });
                changes.push(FileChange {
                    uri: write.uri.to_string(),
                    edits_applied: write.edits_applied,
                    preview: Some(preview(&write.new_contents)),
                });
                files_modified.push(write.uri.to_string());
            }
            for create in &plan.creates {
                if let Some(dir) = create.path.parent() {
                    if !dir.is_dir() {
                        std::fs::create_dir_all(dir)?;
                    }
                }
                let overwritten = read_optional(&create.path)?;
                atomic_write(&create.path, create.new_contents.as_bytes(), &tx_id)?;
                completed.push(Completed::Create { path: create.path.clone(), overwritten });
                changes.push(FileChange {
                    uri: create.uri.to_string(),
                    edits_applied: 0,
                    preview: Some(preview(&create.new_contents)),
                });
                files_modified.push(create.uri.to_string());
            }
            for rename in &plan.renames {
                std::fs::rename(&rename.from, &rename.to)?;
                completed.push(Completed::Rename { from: rename.from.clone(), to: rename.to.clone() });
                changes.push(FileChange {
                    uri: format!("{} -> {}", rename.from_uri, rename.to_uri),
                    edits_applied: 0,
                    preview: None,
                });
                files_modified.push(rename.to_uri.to_string());
            }
            for delete in &plan.deletes {
                if delete.is_dir {
                    std::fs::remove_dir_all(&delete.path)?;
                } else {
                    std::fs::remove_file(&delete.path)?;
                }
                completed.push(Completed::Delete {
                    path: delete.path.clone(),
                    contents: delete.original.clone(),
                    is_dir: delete.is_dir,
                });
                changes.push(FileChange { uri: delete.uri.to_string(), edits_applied: 0, preview: None });
                files_modified.push(delete.uri.to_string());
            }
            Ok(())
        })();

        let total_changes = plan.writes.iter().map(|w| w.edits_applied.max(1)).sum::<usize>()
            + plan.creates.len()
            + plan.renames.len()
            + plan.deletes.len();

        match result {
            Ok(()) => ApplyResult {
                success: true,
                transaction_id: Some(tx_id),
                files_modified,
                total_changes,
                changes,
                rollback_performed: false,
                rollback_incomplete: None,
            },
            Err(err) => {
                log::error!("edit transaction {tx_id} failed: {err}");
                if atomic {
                    let rollback_incomplete = rollback(completed);
                    ApplyResult {
                        success: false,
                        transaction_id: Some(tx_id),
                        files_modified: Vec::new(),
                        total_changes: 0,
                        changes: Vec::new(),
                        rollback_performed: true,
                        rollback_incomplete,
                    }
                } else {
                    ApplyResult {
                        success: false,
                        transaction_id: Some(tx_id),
                        files_modified,
                        total_changes,
                        changes,
                        rollback_performed: false,
                        rollback_incomplete: None,
                    }
                }
            }
        }
    }
}

fn rollback(completed: Vec<Completed>) -> Option<String> {
    let mut failures = Vec::new();
    for step in completed.into_iter().rev() {
        let outcome = match step {
            Completed::Delete { path, contents, is_dir } if !is_dir => std::fs::write(&path, contents),
            Completed::Delete { is_dir: true, .. } => {
                failures.push("directory deletion cannot be rolled back".to_string());
                continue;
            }
            Completed::Rename { from, to } => std::fs::rename(&to, &from),
            Completed::Create { path, overwritten: None } => std::fs::remove_file(&path),
            Completed::Create { path, overwritten: Some(bytes) } => std::fs::write(&path, bytes),
            Completed::Write { path, original: Some(bytes) } => std::fs::write(&path, bytes),
            Completed::Write { path, original: None } => std::fs::remove_file(&path),
        };
        if let Err(err) = outcome {
            failures.push(err.to_string());
        }
    }
    if failures.is_empty() {
        None
    } else {
        Some(failures.join("; "))
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn atomic_write(path: &Path, contents: &[u8], tx_id: &str) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.is_dir() {
            std::fs::create_dir_all(dir)?;
        }
    }
    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(format!(".{tx_id}.tmp"));
    let tmp_path = PathBuf::from(tmp_name);
    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, path)
}

fn preview(text: &str) -> String {
    if text.len() <= PREVIEW_BYTES {
        text.to_string()
    } else {
        let mut end = PREVIEW_BYTES;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    }
}

/// Converts a UTF-16-indexed LSP [`lsp_types::Position`] to a byte offset
/// into `text`. LSP positions are UTF-16 code units unless the client and
/// server negotiated a different `PositionEncodingKind`; this manager has
/// no buffer model of its own, so it assumes the LSP default.
fn position_to_byte_offset(text: &str, pos: &lsp_types::Position) -> usize {
    let mut offset = 0;
    let mut lines = text.split_inclusive('\n');
    for _ in 0..pos.line {
        match lines.next() {
            Some(line) => offset += line.len(),
            None => return text.len(),
        }
    }
    let line = lines.next().unwrap_or("");
    let mut utf16_count = 0u32;
    let mut byte_offset = 0;
    for c in line.chars() {
        if utf16_count >= pos.character {
            break;
        }
        utf16_count += c.len_utf16() as u32;
        byte_offset += c.len_utf8();
    }
    offset + byte_offset
}

fn apply_text_edits(original: &str, edits: &[TextEdit]) -> String {
    let mut result = original.to_string();
    for edit in edits {
        let start = position_to_byte_offset(original, &edit.range.start);
        let end = position_to_byte_offset(original, &edit.range.end);
        result.replace_range(start..end, &edit.new_text);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsp_types::{DocumentChanges, OptionalVersionedTextDocumentIdentifier, Position, Range, TextDocumentEdit};

    fn workspace() -> (tempfile::TempDir, TransactionManager) {
        let dir = tempfile::tempdir().unwrap();
        let mgr = TransactionManager::new(dir.path().to_path_buf());
        (dir, mgr)
    }

    fn edit_uri(dir: &tempfile::TempDir, name: &str) -> Url {
        gateway_stdx::uri::file_path_to_uri(&dir.path().join(name)).unwrap()
    }

    fn single_edit_workspace_edit(uri: Url, sl: u32, sc: u32, el: u32, ec: u32, text: &str) -> WorkspaceEdit {
        WorkspaceEdit {
            changes: None,
            document_changes: Some(DocumentChanges::Edits(vec![TextDocumentEdit {
                text_document: OptionalVersionedTextDocumentIdentifier { uri, version: None },
                edits: vec![OneOf::Left(TextEdit {
                    range: Range { start: Position::new(sl, sc), end: Position::new(el, ec) },
                    new_text: text.to_string(),
                })],
            }])),
            change_annotations: None,
        }
    }

    #[tokio::test]
    async fn applies_a_single_edit_to_an_existing_file() {
        let (dir, mgr) = workspace();
        let path = dir.path().join("a.rs");
        std::fs::write(&path, "hello world").unwrap();
        let uri = edit_uri(&dir, "a.rs");
        let we = single_edit_workspace_edit(uri, 0, 0, 0, 5, "goodbye");

        let result = mgr.apply(&we, ApplyOptions::default()).await.unwrap();
        assert!(result.success);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "goodbye world");
        assert_eq!(result.total_changes, 1);
    }

    #[tokio::test]
    async fn dry_run_leaves_the_file_untouched() {
        let (dir, mgr) = workspace();
        let path = dir.path().join("a.rs");
        std::fs::write(&path, "hello world").unwrap();
        let uri = edit_uri(&dir, "a.rs");
        let we = single_edit_workspace_edit(uri, 0, 0, 0, 5, "goodbye");

        let result = mgr
            .apply(&we, ApplyOptions { atomic: true, dry_run: true })
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello world");
        assert_eq!(result.changes[0].preview.as_deref(), Some("goodbye world"));
    }

    #[tokio::test]
    async fn rejects_a_path_that_escapes_the_workspace() {
        let (dir, mgr) = workspace();
        let outside = Url::parse("file:///etc/passwd").unwrap();
        let we = single_edit_workspace_edit(outside, 0, 0, 0, 1, "x");
        let _ = dir; // keep the tempdir alive for the duration of the assertion
        assert!(mgr.apply(&we, ApplyOptions::default()).await.is_err());
    }

    #[tokio::test]
    async fn rejects_edits_to_a_file_that_does_not_exist() {
        let (dir, mgr) = workspace();
        let uri = edit_uri(&dir, "missing.rs");
        let we = single_edit_workspace_edit(uri, 0, 0, 0, 1, "x");
        assert!(mgr.apply(&we, ApplyOptions::default()).await.is_err());
    }

    #[tokio::test]
    async fn a_bad_file_in_a_multi_file_edit_leaves_every_file_untouched() {
        let (dir, mgr) = workspace();
        let a_path = dir.path().join("a.ts");
        let b_path = dir.path().join("b.ts");
        std::fs::write(&a_path, "const a = 1;").unwrap();
        std::fs::write(&b_path, "const b = 2;").unwrap();

        let a_uri = edit_uri(&dir, "a.ts");
        let b_uri = edit_uri(&dir, "b.ts");
        let we = WorkspaceEdit {
            changes: None,
            document_changes: Some(DocumentChanges::Edits(vec![
                TextDocumentEdit {
                    text_document: OptionalVersionedTextDocumentIdentifier { uri: a_uri, version: None },
                    edits: vec![OneOf::Left(TextEdit {
                        range: Range { start: Position::new(0, 6), end: Position::new(0, 7) },
                        new_text: "9".to_string(),
                    })],
                },
                TextDocumentEdit {
                    text_document: OptionalVersionedTextDocumentIdentifier { uri: b_uri, version: None },
                    edits: vec![
                        OneOf::Left(TextEdit {
                            range: Range { start: Position::new(0, 0), end: Position::new(0, 5) },
                            new_text: "let b".to_string(),
                        }),
                        OneOf::Left(TextEdit {
                            range: Range { start: Position::new(0, 3), end: Position::new(0, 8) },
                            new_text: "BBBBB".to_string(),
                        }),
                    ],
                },
            ])),
            change_annotations: None,
        };

        let err = mgr.apply(&we, ApplyOptions::default()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidEdit(_)));

        assert_eq!(std::fs::read_to_string(&a_path).unwrap(), "const a = 1;");
        assert_eq!(std::fs::read_to_string(&b_path).unwrap(), "const b = 2;");

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.contains(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "stray temp files left behind: {leftovers:?}");
    }

    #[tokio::test]
    async fn create_then_delete_round_trips_through_the_filesystem() {
        let (dir, mgr) = workspace();
        let uri = edit_uri(&dir, "new.rs");
        let create = WorkspaceEdit {
            changes: None,
            document_changes: Some(DocumentChanges::Operations(vec![DocumentChangeOperation::Op(
                ResourceOp::Create(lsp_types::CreateFile { uri: uri.clone(), options: None, annotation_id: None }),
            )])),
            change_annotations: None,
        };
        let result = mgr.apply(&create, ApplyOptions::default()).await.unwrap();
        assert!(result.success);
        assert!(dir.path().join("new.rs").exists());

        let delete = WorkspaceEdit {
            changes: None,
            document_changes: Some(DocumentChanges::Operations(vec![DocumentChangeOperation::Op(
                ResourceOp::Delete(lsp_types::DeleteFile { uri, options: None, annotation_id: None }),
            )])),
            change_annotations: None,
        };
        let result = mgr.apply(&delete, ApplyOptions::default()).await.unwrap();
        assert!(result.success);
        assert!(!dir.path().join("new.rs").exists());
    }
}
