//! Model response extraction.
//!
//! Turns the free-form text a model returns into a validated rating table.
//! Models wrap their JSON in Markdown fences, prepend chatter, and append
//! commentary; all of that is tolerated. What is not tolerated is a JSON
//! payload that disagrees with the catalog: unknown subjects, missing or
//! extra criteria and out-of-scale scores fail the whole response.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ExtractionError;
use crate::model::RubricCatalog;
use crate::prompt::{MAX_SCORE, MIN_SCORE};

/// JSON key naming the subject inside each rating object.
pub const SUBJECT_KEY: &str = "item";

/// One subject's scores, aligned with the catalog's criterion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingRow {
    pub subject: String,
    pub scores: Vec<i64>,
}

/// Tabular ratings with columns `[subject_label] + criteria`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingTable {
    pub columns: Vec<String>,
    pub rows: Vec<RatingRow>,
}

impl RatingTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, subject: &str) -> Option<&RatingRow> {
        self.rows.iter().find(|r| r.subject == subject)
    }

    /// Score for a (subject, criterion) cell.
    pub fn score(&self, subject: &str, criterion: &str) -> Option<i64> {
        // Column 0 is the subject label
        let idx = self.columns.iter().skip(1).position(|c| c == criterion)?;
        self.row(subject).and_then(|r| r.scores.get(idx).copied())
    }
}

/// Everything one model response contributes to a vote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotePayload {
    pub ratings: RatingTable,
    pub justification: String,
    /// The model's best-to-worst ordering, passed through unvalidated.
    pub ranking: Vec<String>,
}

impl VotePayload {
    /// Re-serialize in the shape the prompt asks models to answer with.
    pub fn to_contract_json(&self) -> Value {
        let criteria = self.ratings.columns.iter().skip(1);
        let ratings: Vec<Value> = self
            .ratings
            .rows
            .iter()
            .map(|row| {
                let mut obj = Map::new();
                obj.insert(SUBJECT_KEY.to_string(), Value::from(row.subject.clone()));
                for (name, score) in criteria.clone().zip(&row.scores) {
                    obj.insert(name.clone(), Value::from(*score));
                }
                Value::Object(obj)
            })
            .collect();

        serde_json::json!({
            "ratings": ratings,
            "justification": self.justification,
            "ranking": self.ranking,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawVote {
    ratings: Vec<Map<String, Value>>,
    justification: String,
    ranking: Vec<String>,
}

/// Strip Markdown code fences from a model response.
///
/// When fenced blocks are present the body of the first `json` block wins,
/// then the first untagged block, then any other block. Unclosed trailing
/// fences are treated as running to the end of the text.
pub fn strip_code_fences(response: &str) -> String {
    let mut json_blocks = Vec::new();
    let mut bare_blocks = Vec::new();
    let mut other_blocks = Vec::new();
    let mut in_block = false;
    let mut lang = String::new();
    let mut current_block = String::new();

    let mut finish = |lang: &str, block: String| match lang {
        "json" | "json5" | "jsonc" => json_blocks.push(block),
        "" => bare_blocks.push(block),
        _ => other_blocks.push(block),
    };

    for line in response.lines() {
        let trimmed = line.trim();

        if !in_block && trimmed.starts_with("```") {
            let rest = trimmed.trim_start_matches('`').trim();
            // Single-line block: ```json {...} ```
            if let Some(body) = rest.strip_suffix("```") {
                let (tag, body) = split_fence_tag(body);
                finish(&tag, body.trim().to_string());
                continue;
            }
            in_block = true;
            lang = rest.to_lowercase();
            current_block.clear();
            continue;
        }

        if in_block && trimmed.starts_with("```") {
            in_block = false;
            finish(&lang, std::mem::take(&mut current_block));
            continue;
        }

        if in_block {
            if !current_block.is_empty() {
                current_block.push('\n');
            }
            current_block.push_str(line);
        }
    }

    if in_block && !current_block.is_empty() {
        finish(&lang, current_block);
    }

    if let Some(block) = json_blocks
        .into_iter()
        .chain(bare_blocks)
        .chain(other_blocks)
        .next()
    {
        return block.trim().to_string();
    }

    // Fences that are not on their own line
    remove_fence_markers(response)
}

fn remove_fence_markers(response: &str) -> String {
    response
        .replace("```json", "")
        .replace("```JSON", "")
        .replace("```", "")
        .trim()
        .to_string()
}

fn split_fence_tag(body: &str) -> (String, &str) {
    let body = body.trim_start();
    match body.find(|c: char| c.is_whitespace() || c == '{' || c == '[') {
        Some(0) | None => (String::new(), body),
        Some(idx) => (body[..idx].to_lowercase(), &body[idx..]),
    }
}

/// Upper bound on parse attempts per candidate text.
const MAX_PARSE_ATTEMPTS: usize = 64;

/// Find the first JSON object in a model response.
///
/// Fences are stripped first. When the chosen block holds no object, the
/// whole response is searched with only the fence markers removed. Leading
/// chatter is skipped and anything after the object is ignored.
pub fn locate_json(response: &str) -> Result<Map<String, Value>, ExtractionError> {
    let cleaned = strip_code_fences(response);
    let first_error = match first_object(&cleaned) {
        Ok(obj) => return Ok(obj),
        Err(e) => e,
    };

    let unfenced = remove_fence_markers(response);
    if unfenced != cleaned {
        if let Ok(obj) = first_object(&unfenced) {
            tracing::debug!("JSON object found outside the fenced block");
            return Ok(obj);
        }
    }

    Err(first_error)
}

fn first_object(text: &str) -> Result<Map<String, Value>, ExtractionError> {
    let mut first_error = None;

    for (start, _) in text.match_indices('{').take(MAX_PARSE_ATTEMPTS) {
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(Value::Object(obj))) => return Ok(obj),
            Some(Ok(_)) | None => {}
            Some(Err(e)) => {
                // Ran off the end: every later start lies inside this value.
                let eof = e.is_eof();
                first_error.get_or_insert(ExtractionError::InvalidJson(e.to_string()));
                if eof {
                    break;
                }
            }
        }
    }

    Err(first_error.unwrap_or(ExtractionError::NoJsonObject))
}

/// Parse a model response into a vote payload.
pub fn extract_vote(
    response: &str,
    catalog: &RubricCatalog,
) -> Result<VotePayload, ExtractionError> {
    let obj = locate_json(response)?;
    let raw: RawVote = serde_json::from_value(Value::Object(obj))
        .map_err(|e| ExtractionError::Schema(e.to_string()))?;

    let ratings = build_table(raw.ratings, catalog)?;

    if ratings.rows.len() < catalog.subjects.len() {
        tracing::warn!(
            rated = ratings.rows.len(),
            expected = catalog.subjects.len(),
            "response rates only part of the subjects"
        );
    }

    Ok(VotePayload {
        ratings,
        justification: raw.justification,
        ranking: raw.ranking,
    })
}

/// Parse a model response, falling back to an empty payload.
///
/// Never fails: an extraction error is logged and handed back alongside the
/// empty payload so the caller can record it.
pub fn extract_or_empty(
    response: &str,
    catalog: &RubricCatalog,
) -> (VotePayload, Option<ExtractionError>) {
    match extract_vote(response, catalog) {
        Ok(payload) => (payload, None),
        Err(e) => {
            tracing::warn!(error = %e, "failed to extract ratings from response");
            (VotePayload::default(), Some(e))
        }
    }
}

fn build_table(
    raw_rows: Vec<Map<String, Value>>,
    catalog: &RubricCatalog,
) -> Result<RatingTable, ExtractionError> {
    let mut columns = Vec::with_capacity(catalog.criteria.len() + 1);
    columns.push(catalog.subject_label.clone());
    columns.extend(catalog.criterion_names().map(String::from));

    let mut seen = HashSet::new();
    let mut rows = Vec::with_capacity(raw_rows.len());

    for (idx, raw) in raw_rows.into_iter().enumerate() {
        let subject_key = subject_key_of(&raw, catalog);
        let name = subject_key
            .and_then(|k| raw.get(k))
            .and_then(Value::as_str)
            .ok_or(ExtractionError::MissingSubject { row: idx })?;
        let subject = catalog
            .resolve_subject(name)
            .ok_or_else(|| ExtractionError::UnknownSubject(name.to_string()))?
            .to_string();
        if !seen.insert(subject.clone()) {
            return Err(ExtractionError::DuplicateSubject(subject));
        }

        let mut scores: Vec<Option<i64>> = vec![None; catalog.criteria.len()];
        for (key, value) in &raw {
            if Some(key.as_str()) == subject_key {
                continue;
            }
            let Some(col) = criterion_index(key, catalog) else {
                return Err(ExtractionError::UnexpectedField {
                    subject,
                    field: key.clone(),
                });
            };
            if scores[col].is_some() {
                return Err(ExtractionError::UnexpectedField {
                    subject,
                    field: key.clone(),
                });
            }
            let criterion = &catalog.criteria[col].name;
            let score = value
                .as_i64()
                .ok_or_else(|| ExtractionError::NonIntegerScore {
                    subject: subject.clone(),
                    criterion: criterion.clone(),
                })?;
            if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
                return Err(ExtractionError::ScoreOutOfRange {
                    subject,
                    criterion: criterion.clone(),
                    score,
                });
            }
            scores[col] = Some(score);
        }

        let scores = scores
            .into_iter()
            .zip(&catalog.criteria)
            .map(|(score, criterion)| {
                score.ok_or_else(|| ExtractionError::MissingScore {
                    subject: subject.clone(),
                    criterion: criterion.name.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        rows.push(RatingRow { subject, scores });
    }

    Ok(RatingTable { columns, rows })
}

/// The key a rating object uses for its subject: `item`, or the subject label.
fn subject_key_of<'a>(raw: &'a Map<String, Value>, catalog: &RubricCatalog) -> Option<&'a str> {
    if let Some((key, _)) = raw.get_key_value(SUBJECT_KEY) {
        return Some(key.as_str());
    }
    raw.keys()
        .find(|k| k.trim().eq_ignore_ascii_case(&catalog.subject_label))
        .map(String::as_str)
}

fn criterion_index(key: &str, catalog: &RubricCatalog) -> Option<usize> {
    let key = key.trim();
    catalog
        .criteria
        .iter()
        .position(|c| c.name == key)
        .or_else(|| {
            catalog
                .criteria
                .iter()
                .position(|c| c.name.eq_ignore_ascii_case(key))
        })
}
