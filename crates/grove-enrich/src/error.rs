use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnrichError {
    #[error("no file in the graph matches `{0}`")]
    UnknownFile(String),
}
