#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Kubernetes reported error: {source}")]
    Kube {
        #[from]
        source: kube::Error,
    },

    #[error("Invalid user input: {0}")]
    UserInput(String),

    #[error("{0}")]
    Validation(String),

    #[error("Failed to parse DateTime: {source}")]
    Chrono {
        #[from]
        source: chrono::ParseError,
    },

    #[error("Json error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("Parse duration: {source}")]
    ParseDuration {
        #[from]
        source: parse_duration::parse::Error,
    },

    #[error("Invalid budget schedule: {0}")]
    Schedule(String),

    #[error("Cluster state cache is not yet synced")]
    NotSynced,

    #[error("Candidate is already being disrupted")]
    AlreadyDisrupting,

    #[error("Command execution failed: {0}")]
    CommandFailed(String),
}
