//! The client capability set declared to every backend on `initialize`.
//!
//! Trimmed from `helix_lsp::Client::initialize`'s capability literal
//! (`helix-lsp/src/client.rs`) down to the surfaces this gateway's outer
//! tools actually drive: hover, completion, signature help,
//! definition/references/rename with prepare-support, document symbols,
//! diagnostics, workspace edit/command, workspace symbols, code actions, and
//! formatting. Inlay hints, semantic tokens, and the rest of an editor's
//! rendering-surface capabilities are dropped — this gateway never renders
//! them.

use lsp_types::{
    ClientCapabilities, CodeActionCapabilityResolveSupport, CodeActionClientCapabilities,
    CodeActionKindLiteralSupport, CodeActionLiteralSupport, CompletionClientCapabilities,
    CompletionItemCapability, DiagnosticClientCapabilities, DocumentFormattingClientCapabilities,
    DocumentRangeFormattingClientCapabilities, DynamicRegistrationClientCapabilities,
    GeneralClientCapabilities, HoverClientCapabilities, MarkupKind, PositionEncodingKind,
    PublishDiagnosticsClientCapabilities, RenameClientCapabilities,
    SignatureHelpClientCapabilities, SignatureInformationSettings, TagSupport,
    TextDocumentClientCapabilities, TextDocumentSyncClientCapabilities, WorkspaceClientCapabilities,
    WorkspaceEditClientCapabilities, WorkspaceSymbolClientCapabilities,
};

/// Builds the `ClientCapabilities` value sent on every `initialize` request.
///
/// `snippet_support` mirrors `helix_lsp::Client::initialize`'s
/// `enable_snippets` parameter: off unless the embedding configuration opts
/// in, since the gateway's `codeIntelligence` completion path flattens
/// snippets to plain text by default.
pub fn declared_capabilities(snippet_support: bool) -> ClientCapabilities {
    ClientCapabilities {
        workspace: Some(WorkspaceClientCapabilities {
            apply_edit: Some(true),
            workspace_edit: Some(WorkspaceEditClientCapabilities {
                document_changes: Some(true),
                resource_operations: Some(vec![
                    lsp_types::ResourceOperationKind::Create,
                    lsp_types::ResourceOperationKind::Rename,
                    lsp_types::ResourceOperationKind::Delete,
                ]),
                failure_handling: Some(lsp_types::FailureHandlingKind::Abort),
                ..Default::default()
            }),
            did_change_configuration: Some(DynamicRegistrationClientCapabilities {
                dynamic_registration: Some(false),
            }),
            execute_command: Some(DynamicRegistrationClientCapabilities {
                dynamic_registration: Some(false),
            }),
            symbol: Some(WorkspaceSymbolClientCapabilities {
                dynamic_registration: Some(false),
                ..Default::default()
            }),
            configuration: Some(true),
            ..Default::default()
        }),
        text_document: Some(TextDocumentClientCapabilities {
            synchronization: Some(TextDocumentSyncClientCapabilities {
                dynamic_registration: Some(false),
                will_save: Some(false),
                will_save_wait_until: Some(false),
                did_save: Some(true),
            }),
            hover: Some(HoverClientCapabilities {
                content_format: Some(vec![MarkupKind::Markdown, MarkupKind::PlainText]),
                ..Default::default()
            }),
            completion: Some(CompletionClientCapabilities {
                completion_item: Some(CompletionItemCapability {
                    snippet_support: Some(snippet_support),
                    deprecated_support: Some(true),
                    tag_support: Some(TagSupport {
                        value_set: vec![lsp_types::CompletionItemTag::DEPRECATED],
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            signature_help: Some(SignatureHelpClientCapabilities {
                signature_information: Some(SignatureInformationSettings {
                    documentation_format: Some(vec![MarkupKind::Markdown]),
                    parameter_information: None,
                    active_parameter_support: Some(true),
                }),
                ..Default::default()
            }),
            definition: Some(Default::default()),
            references: Some(Default::default()),
            rename: Some(RenameClientCapabilities {
                dynamic_registration: Some(false),
                prepare_support: Some(true),
                ..Default::default()
            }),
            document_symbol: Some(Default::default()),
            publish_diagnostics: Some(PublishDiagnosticsClientCapabilities {
                related_information: Some(true),
                ..Default::default()
            }),
            diagnostic: Some(DiagnosticClientCapabilities {
                dynamic_registration: Some(false),
                related_document_support: Some(true),
            }),
            code_action: Some(CodeActionClientCapabilities {
                code_action_literal_support: Some(CodeActionLiteralSupport {
                    code_action_kind: CodeActionKindLiteralSupport {
                        value_set: [
                            lsp_types::CodeActionKind::EMPTY,
                            lsp_types::CodeActionKind::QUICKFIX,
                            lsp_types::CodeActionKind::REFACTOR,
                            lsp_types::CodeActionKind::SOURCE,
                        ]
                        .iter()
                        .map(|kind| kind.as_str().to_string())
                        .collect(),
                    },
                }),
                resolve_support: Some(CodeActionCapabilityResolveSupport {
                    properties: vec!["edit".to_string(), "command".to_string()],
                }),
                ..Default::default()
            }),
            formatting: Some(DocumentFormattingClientCapabilities {
                dynamic_registration: Some(false),
            }),
            range_formatting: Some(DocumentRangeFormattingClientCapabilities {
                dynamic_registration: Some(false),
            }),
            ..Default::default()
        }),
        window: Some(Default::default()),
        general: Some(GeneralClientCapabilities {
            position_encodings: Some(vec![PositionEncodingKind::UTF16, PositionEncodingKind::UTF8]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
