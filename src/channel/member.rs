use rand::Rng;
use std::fmt;
use std::sync::Arc;

/// MemberId identifies one live process in a cluster's group membership. It is created when the
/// process joins and is never reused by a later join.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct MemberId(String);

impl MemberId {
    pub fn new(id: impl Into<String>) -> Self {
        MemberId(id.into())
    }

    pub(crate) fn generate(cluster_name: &str) -> Self {
        let suffix: u64 = rand::thread_rng().gen();
        MemberId(format!("{}-{:016x}", cluster_name, suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Copy, Clone, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ViewId(u64);

impl ViewId {
    pub fn new(id: u64) -> Self {
        ViewId(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub(crate) fn next(&self) -> Self {
        ViewId(self.0 + 1)
    }
}

impl fmt::Debug for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// View is an immutable snapshot of the live members of a group. Members are kept in join order,
/// which makes the first member the coordinator of the view.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct View {
    view_id: ViewId,
    members: Arc<Vec<MemberId>>,
}

impl View {
    pub fn new(view_id: ViewId, members: Vec<MemberId>) -> Self {
        View {
            view_id,
            members: Arc::new(members),
        }
    }

    /// The view a member has before it has observed its first view change.
    pub fn empty() -> Self {
        View::new(ViewId::default(), vec![])
    }

    pub fn view_id(&self) -> ViewId {
        self.view_id
    }

    pub fn members(&self) -> &[MemberId] {
        &self.members
    }

    pub fn coordinator(&self) -> Option<&MemberId> {
        self.members.first()
    }

    pub fn is_coordinator(&self, member: &MemberId) -> bool {
        self.coordinator() == Some(member)
    }

    pub fn contains(&self, member: &MemberId) -> bool {
        self.members.contains(member)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members of `previous` that are no longer part of this view.
    pub fn departed_since(&self, previous: &View) -> Vec<MemberId> {
        previous
            .members
            .iter()
            .filter(|m| !self.contains(m))
            .cloned()
            .collect()
    }

    /// Members of this view that were not part of `previous`.
    pub fn joined_since(&self, previous: &View) -> Vec<MemberId> {
        self.members
            .iter()
            .filter(|m| !previous.contains(m))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(id: u64, members: &[&str]) -> View {
        View::new(ViewId::new(id), members.iter().map(|m| MemberId::new(*m)).collect())
    }

    #[test]
    fn coordinator_is_first_member_in_join_order() {
        let v = view(3, &["b", "a", "c"]);

        assert_eq!(v.coordinator(), Some(&MemberId::new("b")));
        assert!(v.is_coordinator(&MemberId::new("b")));
        assert!(!v.is_coordinator(&MemberId::new("a")));
        assert_eq!(View::empty().coordinator(), None);
    }

    #[test]
    fn membership_diff() {
        let before = view(1, &["a", "b", "c"]);
        let after = view(2, &["b", "c", "d"]);

        assert_eq!(after.departed_since(&before), vec![MemberId::new("a")]);
        assert_eq!(after.joined_since(&before), vec![MemberId::new("d")]);
        assert!(after.departed_since(&after).is_empty());
    }

    #[test]
    fn generated_ids_are_unique_per_join() {
        let first = MemberId::generate("repo");
        let second = MemberId::generate("repo");

        assert_ne!(first, second);
        assert!(first.as_str().starts_with("repo-"));
    }

    #[test]
    fn view_ids_advance() {
        let id = ViewId::new(7);
        assert_eq!(id.next().as_u64(), 8);
        assert!(id.next() > id);
    }
}
