use std::cmp::Ordering;

use lsp_types::{
    DocumentChangeOperation, DocumentChanges, OneOf, OptionalVersionedTextDocumentIdentifier,
    Position, TextDocumentEdit, TextEdit, WorkspaceEdit,
};

use crate::{Error, Result};

fn pos_key(p: &Position) -> (u32, u32) {
    (p.line, p.character)
}

fn pos_cmp(a: &Position, b: &Position) -> Ordering {
    pos_key(a).cmp(&pos_key(b))
}

/// Converts a `WorkspaceEdit` into a single canonical `documentChanges`
/// list. The `changes` (URI→edits) form is folded
/// into unversioned `TextDocumentEdit`s; a `documentChanges` input is
/// returned unchanged in shape. Per-URI edits are sorted back-to-front so
/// applying them in list order never invalidates a later edit's range.
pub fn canonicalize_edit(edit: &WorkspaceEdit) -> Result<Vec<DocumentChangeOperation>> {
    let mut ops = match &edit.document_changes {
        Some(DocumentChanges::Operations(ops)) => ops.clone(),
        Some(DocumentChanges::Edits(edits)) => edits
            .iter()
            .cloned()
            .map(DocumentChangeOperation::Edit)
            .collect(),
        None => edit
            .changes
            .as_ref()
            .map(|changes| {
                changes
                    .iter()
                    .map(|(uri, edits)| {
                        DocumentChangeOperation::Edit(TextDocumentEdit {
                            text_document: OptionalVersionedTextDocumentIdentifier {
                                uri: uri.clone(),
                                version: None,
                            },
                            edits: edits.iter().cloned().map(OneOf::Left).collect(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default(),
    };

    for op in &mut ops {
        if let DocumentChangeOperation::Edit(document_edit) = op {
            sort_and_validate(document_edit)?;
        }
    }

    Ok(ops)
}

fn sort_and_validate(document_edit: &mut TextDocumentEdit) -> Result<()> {
    let mut edits: Vec<TextEdit> = document_edit
        .edits
        .iter()
        .map(|e| match e {
            OneOf::Left(edit) => edit.clone(),
            OneOf::Right(annotated) => annotated.text_edit.clone(),
        })
        .collect();

    edits.sort_by(|a, b| {
        pos_cmp(&b.range.start, &a.range.start).then_with(|| pos_cmp(&b.range.end, &a.range.end))
    });

    for pair in edits.windows(2) {
        let (later, earlier) = (&pair[0], &pair[1]);
        if pos_cmp(&later.range.start, &earlier.range.end) == Ordering::Less {
            return Err(Error::InvalidEdit(format!(
                "overlapping edits for {}: {:?} and {:?}",
                document_edit.text_document.uri, later.range, earlier.range
            )));
        }
    }

    document_edit.edits = edits.into_iter().map(OneOf::Left).collect();
    Ok(())
}
