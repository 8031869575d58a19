use crate::channel::{MemberId, ViewId};
use crate::dispatcher::DecodeError;
use crate::grpc::{
    proto_lock_message, ProtoLockDenied, ProtoLockGranted, ProtoLockMessage, ProtoLockOwner, ProtoLockRecord,
    ProtoLockReleased, ProtoLockRequest, ProtoLockStateQuery, ProtoLockStateTransfer,
};
use crate::locking::api::HolderId;
use crate::locking::table::LockRecord;
use chrono::{TimeZone, Utc};
use std::convert::TryFrom;
use std::fmt;

/// LockOwner is a holder on a specific member. A member's locks are all dropped when it leaves
/// the view.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct LockOwner {
    pub member: MemberId,
    pub holder: HolderId,
}

impl fmt::Debug for LockOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.member, self.holder.as_u64())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum LockMessage {
    Request(LockRequest),
    Granted(LockGrant),
    Denied(LockDenial),
    Released(LockRelease),
    StateTransfer(LockStateTransfer),
    StateQuery(LockStateQuery),
}

/// Asks the coordinator for every name at once. Ids are unique per member, and a retry against a
/// new coordinator reuses the id.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LockRequest {
    pub request_id: u64,
    pub owner: LockOwner,
    pub names: Vec<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LockGrant {
    pub request_id: u64,
    pub owner: LockOwner,
    pub names: Vec<String>,
    /// The names the owner didn't already hold when the coordinator decided.
    pub newly_granted: Vec<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LockDenial {
    pub request_id: u64,
    pub owner: LockOwner,
    pub conflicts: Vec<String>,
}

/// Releases the names `owner` holds among `names`. A zero `request_id` marks a release the
/// coordinator issued for a departed member.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LockRelease {
    pub request_id: u64,
    pub owner: LockOwner,
    pub names: Vec<String>,
}

/// The coordinator's full table, sent to members that joined in `view_id`.
#[derive(Clone, Debug, PartialEq)]
pub struct LockStateTransfer {
    pub view_id: ViewId,
    pub records: Vec<(String, LockRecord<LockOwner>)>,
}

/// Asks the coordinator to send its table. Posted once by every engine when it starts.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LockStateQuery {
    pub member: MemberId,
}

// ------- Conversions --------

impl From<LockOwner> for ProtoLockOwner {
    fn from(owner: LockOwner) -> Self {
        ProtoLockOwner {
            member_id: owner.member.into_inner(),
            holder_id: owner.holder.as_u64(),
        }
    }
}

impl From<ProtoLockOwner> for LockOwner {
    fn from(proto_owner: ProtoLockOwner) -> Self {
        LockOwner {
            member: MemberId::new(proto_owner.member_id),
            holder: HolderId::new(proto_owner.holder_id),
        }
    }
}

fn decode_owner(owner: Option<ProtoLockOwner>) -> Result<LockOwner, DecodeError> {
    owner.map(LockOwner::from).ok_or(DecodeError::MissingField("owner"))
}

impl From<LockMessage> for ProtoLockMessage {
    fn from(message: LockMessage) -> Self {
        let kind = match message {
            LockMessage::Request(request) => proto_lock_message::Kind::Request(ProtoLockRequest {
                request_id: request.request_id,
                owner: Some(request.owner.into()),
                names: request.names,
            }),
            LockMessage::Granted(grant) => proto_lock_message::Kind::Granted(ProtoLockGranted {
                request_id: grant.request_id,
                owner: Some(grant.owner.into()),
                names: grant.names,
                newly_granted: grant.newly_granted,
            }),
            LockMessage::Denied(denial) => proto_lock_message::Kind::Denied(ProtoLockDenied {
                request_id: denial.request_id,
                owner: Some(denial.owner.into()),
                conflicts: denial.conflicts,
            }),
            LockMessage::Released(release) => proto_lock_message::Kind::Released(ProtoLockReleased {
                request_id: release.request_id,
                owner: Some(release.owner.into()),
                names: release.names,
            }),
            LockMessage::StateTransfer(transfer) => {
                proto_lock_message::Kind::StateTransfer(ProtoLockStateTransfer {
                    view_id: transfer.view_id.as_u64(),
                    records: transfer
                        .records
                        .into_iter()
                        .map(|(name, record)| ProtoLockRecord {
                            name,
                            owner: Some(record.owner.into()),
                            granted_at_millis: record.granted_at.timestamp_millis(),
                        })
                        .collect(),
                })
            }
            LockMessage::StateQuery(query) => proto_lock_message::Kind::StateQuery(ProtoLockStateQuery {
                member_id: query.member.into_inner(),
            }),
        };

        ProtoLockMessage { kind: Some(kind) }
    }
}

impl TryFrom<ProtoLockMessage> for LockMessage {
    type Error = DecodeError;

    fn try_from(proto_message: ProtoLockMessage) -> Result<Self, Self::Error> {
        let message = match proto_message.kind.ok_or(DecodeError::MissingField("kind"))? {
            proto_lock_message::Kind::Request(request) => LockMessage::Request(LockRequest {
                request_id: request.request_id,
                owner: decode_owner(request.owner)?,
                names: request.names,
            }),
            proto_lock_message::Kind::Granted(grant) => LockMessage::Granted(LockGrant {
                request_id: grant.request_id,
                owner: decode_owner(grant.owner)?,
                names: grant.names,
                newly_granted: grant.newly_granted,
            }),
            proto_lock_message::Kind::Denied(denial) => LockMessage::Denied(LockDenial {
                request_id: denial.request_id,
                owner: decode_owner(denial.owner)?,
                conflicts: denial.conflicts,
            }),
            proto_lock_message::Kind::Released(release) => LockMessage::Released(LockRelease {
                request_id: release.request_id,
                owner: decode_owner(release.owner)?,
                names: release.names,
            }),
            proto_lock_message::Kind::StateTransfer(transfer) => {
                let mut records = Vec::with_capacity(transfer.records.len());
                for proto_record in transfer.records {
                    let granted_at = Utc
                        .timestamp_millis_opt(proto_record.granted_at_millis)
                        .single()
                        .ok_or(DecodeError::InvalidField("granted_at_millis"))?;
                    let record = LockRecord {
                        owner: decode_owner(proto_record.owner)?,
                        granted_at,
                    };
                    records.push((proto_record.name, record));
                }

                LockMessage::StateTransfer(LockStateTransfer {
                    view_id: ViewId::new(transfer.view_id),
                    records,
                })
            }
            proto_lock_message::Kind::StateQuery(query) => LockMessage::StateQuery(LockStateQuery {
                member: MemberId::new(query.member_id),
            }),
        };

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Payload;

    fn owner() -> LockOwner {
        LockOwner {
            member: MemberId::new("cluster-1"),
            holder: HolderId::new(3),
        }
    }

    #[test]
    fn state_transfer_keeps_grant_times_to_the_millisecond() {
        let granted_at = Utc.timestamp_millis_opt(1_600_000_000_123).unwrap();
        let message = LockMessage::StateTransfer(LockStateTransfer {
            view_id: ViewId::new(4),
            records: vec![("lock1".to_string(), LockRecord { owner: owner(), granted_at })],
        });

        let decoded = Payload::decode(Payload::Locking(message.clone()).encode()).unwrap();

        assert_eq!(decoded, Payload::Locking(message));
    }

    #[test]
    fn owner_is_required() {
        let proto_message = ProtoLockMessage {
            kind: Some(proto_lock_message::Kind::Released(ProtoLockReleased {
                request_id: 1,
                owner: None,
                names: vec!["lock1".to_string()],
            })),
        };

        let result = LockMessage::try_from(proto_message);

        assert!(matches!(result, Err(DecodeError::MissingField("owner"))));
    }
}
