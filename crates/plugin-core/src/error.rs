use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("forwarding to the admin set was requested but admins_id is empty")]
    NoAdminDestination,

    #[error("invalid pipeline config: {0}")]
    InvalidConfig(String),
}
