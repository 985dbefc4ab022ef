// =============================================================================
// Test fixtures shared by the unit tests
// =============================================================================

use chrono::NaiveDate;

use crate::sqpe::TrainingSet;
use crate::types::{Going, HistoricalRecord, Race, Runner};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Class-4 record ridden by "j1".
pub fn record(
    race_id: &str,
    date: NaiveDate,
    runner_id: &str,
    trainer: &str,
    position: Option<u32>,
) -> HistoricalRecord {
    record_with(race_id, date, runner_id, trainer, "j1", 4, position)
}

pub fn record_with(
    race_id: &str,
    date: NaiveDate,
    runner_id: &str,
    trainer: &str,
    jockey: &str,
    class: u8,
    position: Option<u32>,
) -> HistoricalRecord {
    HistoricalRecord {
        race_id: race_id.to_string(),
        date,
        venue: "Ascot".to_string(),
        distance_m: 1600,
        class,
        runner_id: runner_id.to_string(),
        trainer: trainer.to_string(),
        jockey: jockey.to_string(),
        position,
        odds: None,
    }
}

pub fn runner(id: &str, odds: f64, trainer: &str, jockey: &str, form: &str) -> Runner {
    Runner {
        id: id.to_string(),
        name: format!("Runner {id}"),
        age: 4,
        weight_kg: 57.0,
        barrier: 1,
        form: form.to_string(),
        odds,
        trainer: trainer.to_string(),
        jockey: jockey.to_string(),
        sectionals: Vec::new(),
    }
}

pub fn race(id: &str, date: NaiveDate, class: u8, runners: Vec<Runner>) -> Race {
    Race {
        id: id.to_string(),
        venue: "Ascot".to_string(),
        date,
        distance_m: 1600,
        going: Going::Good,
        class,
        runners,
    }
}

/// Two-column SQPE training set: win chance rises with `form`, `draw` is
/// noise. Four rows share each race date.
pub fn synthetic_training(n: usize) -> TrainingSet {
    let start = date(2023, 1, 1);
    let mut rows = Vec::with_capacity(n);
    let mut labels = Vec::with_capacity(n);
    let mut dates = Vec::with_capacity(n);
    for i in 0..n {
        let form = ((i * 37) % 100) as f64 / 100.0;
        let draw = ((i * 13) % 12) as f64;
        let noise = ((i * 7919) % 100) as f64 / 100.0;
        rows.push(vec![form, draw]);
        labels.push(noise < form * 0.8);
        dates.push(start + chrono::Duration::days((i / 4) as i64));
    }
    TrainingSet {
        feature_names: vec!["form".into(), "draw".into()],
        rows,
        labels,
        dates,
    }
}
