pub(crate) mod answer_store;
pub(crate) mod guard_policy;
pub(crate) mod ranking;
pub(crate) mod score_normalizer;
pub(crate) mod session_clock;
pub(crate) mod session_state;
pub(crate) mod submission;
