// =============================================================================
// TIE Module — Trainer Intent Engine
// =============================================================================
//
// - aggregates: per-operator and per-pilot win statistics as of a date
// - features:   named runner feature vector, clipped to configured ranges
// - logistic:   regularised linear classifier
// - labeling:   caller-supplied "high intent" policies, training-set builder
// - engine:     fit / predict_intent_score / classification

pub mod aggregates;
pub mod engine;
pub mod features;
pub mod labeling;
pub mod logistic;

pub use aggregates::{
    build_operator_aggregates, build_pilot_aggregates, AggregateSnapshot, AggregateStats,
    AggregateTable,
};
pub use engine::{IntentClass, TieEngine, TieModel, TieSignal};
pub use features::{build_runner_features, CompetitorContext, TieFeatureVector, TIE_FEATURE_NAMES};
pub use labeling::{ClassDropRestPolicy, Composition, LabelingPolicy, TieTrainingSet};
