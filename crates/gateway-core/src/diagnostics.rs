//! `getDiagnostics([uri], [severity], [maxResults], [includeRelated])`: reads
//! back the diagnostics the registry has already accumulated from
//! `textDocument/publishDiagnostics` pushes rather than issuing a pull
//! request — there is no LSP pull-diagnostics round trip here, only a read of
//! [`gateway_lsp::Client::get_diagnostics`]/`get_all_diagnostics`.

use lsp_types::{Diagnostic, DiagnosticSeverity};

use crate::error::Result;
use crate::Gateway;

#[derive(Debug, Clone, Default)]
pub struct DiagnosticsQuery {
    /// Restrict to a single document. `None` aggregates across every
    /// currently connected client.
    pub uri: Option<String>,
    pub min_severity: Option<DiagnosticSeverity>,
    pub max_results: Option<usize>,
    pub include_related: bool,
}

#[derive(Debug, Clone)]
pub struct FileDiagnostics {
    pub uri: String,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Default)]
pub struct DiagnosticsSummary {
    pub files: Vec<FileDiagnostics>,
    pub truncated: bool,
}

fn passes_severity(diagnostic: &Diagnostic, min_severity: Option<DiagnosticSeverity>) -> bool {
    match (diagnostic.severity, min_severity) {
        (_, None) => true,
        (Some(actual), Some(min)) => actual.cmp_severity(min),
        (None, Some(_)) => false,
    }
}

/// `DiagnosticSeverity` orders `Error` (1) as the most severe, so "at least
/// as severe as" means a numerically smaller or equal value.
trait SeverityOrd {
    fn cmp_severity(self, min: DiagnosticSeverity) -> bool;
}

impl SeverityOrd for DiagnosticSeverity {
    fn cmp_severity(self, min: DiagnosticSeverity) -> bool {
        self.0 <= min.0
    }
}

fn strip_related(mut diagnostic: Diagnostic, include_related: bool) -> Diagnostic {
    if !include_related {
        diagnostic.related_information = None;
    }
    diagnostic
}

impl Gateway {
    pub async fn get_diagnostics(&self, query: DiagnosticsQuery) -> Result<DiagnosticsSummary> {
        let mut files: Vec<FileDiagnostics> = if let Some(uri) = &query.uri {
            let (workspace, language) = self.resolve_uri(uri)?;
            let client = self.pool.get(&language, &workspace).await?;
            let diagnostics = client.get_diagnostics(uri);
            vec![FileDiagnostics {
                uri: uri.clone(),
                diagnostics,
            }]
        } else {
            self.pool
                .get_all_active()
                .into_iter()
                .flat_map(|(_language, client)| {
                    client
                        .get_all_diagnostics()
                        .into_iter()
                        .map(|(uri, diagnostics)| FileDiagnostics { uri, diagnostics })
                        .collect::<Vec<_>>()
                })
                .collect()
        };

        let mut truncated = false;
        let mut total = 0usize;
        for file in &mut files {
            file.diagnostics.retain(|d| passes_severity(d, query.min_severity));
            file.diagnostics = std::mem::take(&mut file.diagnostics)
                .into_iter()
                .map(|d| strip_related(d, query.include_related))
                .collect();
        }
        files.retain(|f| !f.diagnostics.is_empty());

        if let Some(max) = query.max_results {
            let mut kept = Vec::new();
            'outer: for mut file in files {
                let remaining = max.saturating_sub(total);
                if remaining == 0 {
                    truncated = true;
                    break 'outer;
                }
                if file.diagnostics.len() > remaining {
                    file.diagnostics.truncate(remaining);
                    truncated = true;
                }
                total += file.diagnostics.len();
                kept.push(file);
            }
            files = kept;
        }

        Ok(DiagnosticsSummary { files, truncated })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_severity_satisfies_a_warning_floor() {
        assert!(DiagnosticSeverity::ERROR.cmp_severity(DiagnosticSeverity::WARNING));
        assert!(!DiagnosticSeverity::HINT.cmp_severity(DiagnosticSeverity::WARNING));
    }
}
