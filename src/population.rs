use crate::candidate::Candidate;
use crate::error::Result;
use crate::space::ParamSpace;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// The pool of best-known candidates. The slot index is the canonical
/// identity used for replacement targeting; ordering by score exists only
/// for reporting.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Population {
    pub members: Vec<Candidate>,
}

/// One persisted leaderboard line; enough to rebuild a candidate exactly,
/// with its replacement target reset to None.
#[derive(Debug, Serialize, Deserialize)]
struct LeaderboardRecord {
    score: u64,
    generation: usize,
    values: BTreeMap<String, f64>,
}

impl Population {
    pub fn new() -> Population {
        Population {
            members: Vec::new(),
        }
    }

    /// Fixed population size for a given space and multiplier.
    pub fn required_size(space: &ParamSpace, multiplier: usize) -> usize {
        multiplier * space.dimensions()
    }

    pub fn best(&self) -> Option<&Candidate> {
        self.members.iter().max_by_key(|c| c.score)
    }

    /// Members ordered by descending score, for reporting only.
    pub fn ranked(&self) -> Vec<&Candidate> {
        let mut ranked: Vec<&Candidate> = self.members.iter().collect();
        ranked.sort_by(|a, b| b.score.cmp(&a.score));
        ranked
    }

    /// Rewrites the whole leaderboard atomically: the records are written to
    /// a sibling temp file which then replaces `path`, so a crash or a failed
    /// write never leaves a torn file behind.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut buffer = String::new();
        for member in &self.members {
            let record = LeaderboardRecord {
                score: member.score.unwrap_or(0),
                generation: member.generation,
                values: member.values.clone(),
            };
            buffer.push_str(&serde_json::to_string(&record)?);
            buffer.push('\n');
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, buffer)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Rebuilds the population from a leaderboard file. Returns the restored
    /// members and the generation the search should continue at (one past
    /// the highest recorded generation). A missing file yields an empty
    /// population starting at generation 0; an unreadable record is a
    /// persistence error rather than a silent restart.
    pub fn load(path: &Path) -> Result<(Population, usize)> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok((Population::new(), 0)),
            Err(e) => return Err(e.into()),
        };

        let mut members = Vec::new();
        let mut next_generation = 0;
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let record: LeaderboardRecord = serde_json::from_str(line)?;
            next_generation = next_generation.max(record.generation + 1);
            let mut candidate = Candidate::new(record.values, record.generation, None);
            candidate.score = Some(record.score);
            members.push(candidate);
        }
        Ok((Population { members }, next_generation))
    }
}
