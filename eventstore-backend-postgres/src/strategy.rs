/// Which index encoding backs a [`crate::PostgresStore`]: `Ts` (tsvector
/// GIN full-text index) or `Tt` (tag side-table). Both implement the same
/// [`eventstore_core::DcbRecorder`] contract and must be behaviorally
/// indistinguishable; see `postgres_ts.py`/`postgres_tt.py`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexStrategy {
    Ts,
    Tt,
}
