use std::path::{Path, PathBuf};

use evermem_api::{MemoryApi, NewMemory};
use evermem_store::{HistoryPreview, PreviewRecord};
use evermem_transcript::{
    ends_with_turn_marker, extract_pairs, read_lines, truncate_content, ExtractOptions, Extraction,
    Role, HISTORY_CHARS,
};
use serde::Serialize;

use crate::parse::{now_millis, timestamp_millis};
use crate::redact::redact_secrets;
use crate::render::one_line;

/// Upload progress is reported at most this many times (plus the last pair).
const PROGRESS_STEPS: usize = 10;
const PREVIEW_CHARS: usize = 40;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStats {
    pub total_lines: usize,
    pub qa_pairs_found: usize,
    pub interrupted_skipped: usize,
    pub system_skipped: usize,
    pub total_user_chars: usize,
    pub total_assistant_chars: usize,
    pub total_chars: usize,
}

impl HistoryStats {
    fn from_extraction(total_lines: usize, extraction: &Extraction) -> Self {
        let total_user_chars = extraction.pairs.iter().map(|p| p.user_chars()).sum();
        let total_assistant_chars = extraction.pairs.iter().map(|p| p.assistant_chars()).sum();
        Self {
            total_lines,
            qa_pairs_found: extraction.pairs.len(),
            interrupted_skipped: extraction.stats.interrupted,
            system_skipped: extraction.stats.system_skipped,
            total_user_chars,
            total_assistant_chars,
            total_chars: total_user_chars + total_assistant_chars,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractReport {
    pub preview_file: PathBuf,
    pub stats: HistoryStats,
}

fn preview_records(extraction: Extraction) -> Vec<PreviewRecord> {
    extraction
        .pairs
        .into_iter()
        .enumerate()
        .map(|(i, p)| PreviewRecord::new(i + 1, p.user, p.assistant, p.timestamp))
        .collect()
}

/// Extract every pair of `transcript` into the preview file for review.
pub fn extract_history(transcript: &Path, preview: &HistoryPreview) -> anyhow::Result<ExtractReport> {
    let lines = read_lines(transcript)?;
    let extraction = extract_pairs(&lines, &ExtractOptions::all_pairs());
    let stats = HistoryStats::from_extraction(lines.len(), &extraction);
    preview.write(&preview_records(extraction))?;
    tracing::info!(pairs = stats.qa_pairs_found, path = %preview.path().display(), "history preview written");
    Ok(ExtractReport {
        preview_file: preview.path().to_path_buf(),
        stats,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPreview {
    pub index: usize,
    pub total: usize,
    /// `✓` both stored, `~` one of the two, `✗` neither.
    pub status: &'static str,
    pub question_preview: String,
    pub answer_preview: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReport {
    pub uploaded: usize,
    pub failed: usize,
    pub total_qa_pairs: usize,
    pub group_id: String,
    pub previews: Vec<UploadPreview>,
}

fn store_history_message(api: &dyn MemoryApi, role: Role, text: &str, id: String) -> bool {
    let content = truncate_content(&redact_secrets(text), HISTORY_CHARS).content;
    match api.add(&NewMemory::new(role, content).with_id(id)) {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(%role, "history upload failed: {e}");
            false
        }
    }
}

/// Store every record, user then assistant, and collect sampled progress.
/// Message ids use the pair's own timestamp, or now when it has none.
pub fn upload_records(api: &dyn MemoryApi, records: &[PreviewRecord], group_id: &str) -> UploadReport {
    let total = records.len();
    let interval = (total / PROGRESS_STEPS).max(1);
    let mut report = UploadReport {
        total_qa_pairs: total,
        group_id: group_id.to_string(),
        ..UploadReport::default()
    };

    for (i, record) in records.iter().enumerate() {
        let stamp = timestamp_millis(&record.timestamp).unwrap_or_else(now_millis);
        let user_ok = store_history_message(api, Role::User, &record.user, format!("hist_u_{stamp}_{i}"));
        let assistant_ok = store_history_message(
            api,
            Role::Assistant,
            &record.assistant,
            format!("hist_a_{stamp}_{i}"),
        );
        for ok in [user_ok, assistant_ok] {
            if ok {
                report.uploaded += 1;
            } else {
                report.failed += 1;
            }
        }

        if i % interval == 0 || i + 1 == total {
            report.previews.push(UploadPreview {
                index: i + 1,
                total,
                status: match (user_ok, assistant_ok) {
                    (true, true) => "✓",
                    (false, false) => "✗",
                    _ => "~",
                },
                question_preview: one_line(&record.user, PREVIEW_CHARS),
                answer_preview: one_line(&record.assistant, PREVIEW_CHARS),
            });
        }
    }
    report
}

/// Upload the staged preview, then delete it.
pub fn upload_history(
    api: &dyn MemoryApi,
    preview: &HistoryPreview,
    group_id: &str,
) -> anyhow::Result<UploadReport> {
    let records = preview.read()?;
    let report = upload_records(api, &records, group_id);
    preview.remove()?;
    Ok(report)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddReport {
    /// Whether the transcript ends with a closed turn.
    pub complete: bool,
    pub total_lines: usize,
    pub stats: HistoryStats,
    pub upload: UploadReport,
}

/// One-shot extract and upload without a preview file.
pub fn add_history(api: &dyn MemoryApi, transcript: &Path, group_id: &str) -> anyhow::Result<AddReport> {
    let lines = read_lines(transcript)?;
    let complete = ends_with_turn_marker(&lines);
    if !complete {
        tracing::warn!(path = %transcript.display(), "last turn is not closed yet; its pair may be incomplete");
    }
    let extraction = extract_pairs(&lines, &ExtractOptions::all_pairs());
    let stats = HistoryStats::from_extraction(lines.len(), &extraction);
    let upload = upload_records(api, &preview_records(extraction), group_id);
    Ok(AddReport {
        complete,
        total_lines: lines.len(),
        stats,
        upload,
    })
}
