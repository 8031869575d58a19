use crate::channel::member::MemberId;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    // Hub logic runs on a background task. This error is returned if the task has exited.
    #[error("Group hub for cluster '{0}' has exited")]
    HubExited(String),

    #[error("Member {0} has already joined the group")]
    DuplicateMember(MemberId),

    #[error("Channel of cluster '{0}' is not connected")]
    Closed(String),

    #[error("Relay transport failure: {0}")]
    Transport(String),

    #[error("Timed out during {0}")]
    Timeout(&'static str),
}

impl From<tonic::Status> for ChannelError {
    fn from(status: tonic::Status) -> Self {
        ChannelError::Transport(format!("{:?}: {}", status.code(), status.message()))
    }
}

impl From<tonic::transport::Error> for ChannelError {
    fn from(e: tonic::transport::Error) -> Self {
        ChannelError::Transport(e.to_string())
    }
}
