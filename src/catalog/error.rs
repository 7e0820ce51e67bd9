#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read manifest {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid manifest yaml in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("manifest validation failed: {0}")]
    InvalidManifest(String),
    #[error("schema introspection failed: {source}")]
    Introspection {
        #[source]
        source: rusqlite::Error,
    },
    #[error("no table matches `{token}`")]
    UnknownEntity { token: String },
    #[error("`{token}` is ambiguous; it could mean {}", .candidates.join(" or "))]
    AmbiguousEntity {
        token: String,
        candidates: Vec<String>,
    },
    #[error("unknown table `{table}`")]
    UnknownTable { table: String },
    #[error("table `{table}` has no column `{column}`")]
    UnknownColumn { table: String, column: String },
}
