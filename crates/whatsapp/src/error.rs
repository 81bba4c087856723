use relay_channels::CloseInfo;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The WhatsApp session was invalidated; the operator has to link the
    /// device again before the push ingestor can run.
    #[error("whatsapp session logged out ({reason}); re-link the device and restart")]
    LoggedOut { reason: String, close: CloseInfo },

    #[error(transparent)]
    Channel(#[from] relay_channels::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
