// =============================================================================
// Runner History — one runner's prior runs, most recent first
// =============================================================================
//
// Built from the corpus when it knows the runner; otherwise from the race-card
// form line, which carries positions but no class, date or pilot.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::history::HistoricalCorpus;
use crate::types::{FormLine, UNPLACED_POSITION};

/// One prior run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorRun {
    pub date: Option<NaiveDate>,
    pub class: Option<u8>,
    /// Finishing position; `None` for non-finishers.
    pub position: Option<u32>,
    pub jockey: Option<String>,
}

impl PriorRun {
    pub fn won(&self) -> bool {
        self.position == Some(1)
    }

    /// Position used for averaging; non-finishers count as unplaced.
    pub fn effective_position(&self) -> u32 {
        self.position.unwrap_or(UNPLACED_POSITION)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunnerHistory {
    runs: Vec<PriorRun>,
    from_form_line: bool,
}

impl RunnerHistory {
    /// Runs strictly before `as_of` for `runner_id`, most recent first.
    pub fn from_corpus(corpus: &HistoricalCorpus, runner_id: &str, as_of: NaiveDate) -> Self {
        let runs = corpus
            .runner_runs(runner_id, as_of)
            .into_iter()
            .map(|r| PriorRun {
                date: Some(r.date),
                class: Some(r.class),
                position: r.position,
                jockey: Some(r.jockey.clone()),
            })
            .collect();
        Self {
            runs,
            from_form_line: false,
        }
    }

    pub fn from_form_line(form: &FormLine) -> Self {
        let runs = form
            .positions()
            .iter()
            .map(|&p| PriorRun {
                date: None,
                class: None,
                position: Some(p),
                jockey: None,
            })
            .collect();
        Self {
            runs,
            from_form_line: true,
        }
    }

    /// Corpus history, falling back to the form line when the corpus holds
    /// fewer than `min_runs` runs for this runner.
    pub fn resolve(
        corpus: &HistoricalCorpus,
        runner_id: &str,
        form: &FormLine,
        as_of: NaiveDate,
        min_runs: usize,
    ) -> Self {
        let from_corpus = Self::from_corpus(corpus, runner_id, as_of);
        if from_corpus.len() < min_runs && form.len() > from_corpus.len() {
            return Self::from_form_line(form);
        }
        from_corpus
    }

    pub fn runs(&self) -> &[PriorRun] {
        &self.runs
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn is_from_form_line(&self) -> bool {
        self.from_form_line
    }

    pub fn last_run(&self) -> Option<&PriorRun> {
        self.runs.first()
    }

    /// Effective finishing positions, most recent first.
    pub fn positions(&self) -> Vec<u32> {
        self.runs.iter().map(PriorRun::effective_position).collect()
    }

    /// Days between the last dated run and `as_of`.
    pub fn days_since_last_run(&self, as_of: NaiveDate) -> Option<i64> {
        let last = self.last_run()?.date?;
        Some((as_of - last).num_days())
    }

    /// Current class number minus the last run's class number. Positive means
    /// the runner drops into a weaker race.
    pub fn class_delta(&self, current_class: u8) -> Option<i32> {
        let last = self.last_run()?.class?;
        Some(current_class as i32 - last as i32)
    }
}
