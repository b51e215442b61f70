use std::collections::HashSet;

use crate::UserId;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteAction {
    Like,
    Dislike,
}

/// Names one of the two voter sets of a post
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum VoteSet {
    Likes,
    Dislikes,
}

impl VoteSet {
    pub fn other(self) -> VoteSet {
        match self {
            VoteSet::Likes => VoteSet::Dislikes,
            VoteSet::Dislikes => VoteSet::Likes,
        }
    }
}

impl VoteAction {
    pub fn target(self) -> VoteSet {
        match self {
            VoteAction::Like => VoteSet::Likes,
            VoteAction::Dislike => VoteSet::Dislikes,
        }
    }
}

/// A vote, phrased as the two set operations a store has to apply in one
/// atomic document update: pull `user` from `pull_from`, then toggle `user`'s
/// membership in `toggle_in`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct VoteUpdate {
    pub user: UserId,
    pub pull_from: VoteSet,
    pub toggle_in: VoteSet,
}

impl VoteUpdate {
    pub fn new(user: UserId, action: VoteAction) -> VoteUpdate {
        VoteUpdate {
            user,
            pull_from: action.target().other(),
            toggle_in: action.target(),
        }
    }
}

/// The like and dislike sets of a post. No user is ever in both.
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct VoteSets {
    pub likes: HashSet<UserId>,
    pub dislikes: HashSet<UserId>,
}

impl VoteSets {
    pub fn set_mut(&mut self, set: VoteSet) -> &mut HashSet<UserId> {
        match set {
            VoteSet::Likes => &mut self.likes,
            VoteSet::Dislikes => &mut self.dislikes,
        }
    }

    pub fn apply(&mut self, u: VoteUpdate) {
        self.set_mut(u.pull_from).remove(&u.user);
        let target = self.set_mut(u.toggle_in);
        if !target.remove(&u.user) {
            target.insert(u.user);
        }
    }

    /// Casts `action` for `user` and returns the resulting tally.
    pub fn vote(&mut self, user: UserId, action: VoteAction) -> VoteTally {
        self.apply(VoteUpdate::new(user, action));
        self.tally(user)
    }

    pub fn tally(&self, user: UserId) -> VoteTally {
        VoteTally {
            likes: self.likes.len(),
            dislikes: self.dislikes.len(),
            user_liked: self.likes.contains(&user),
            user_disliked: self.dislikes.contains(&user),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct VoteTally {
    pub likes: usize,
    pub dislikes: usize,
    pub user_liked: bool,
    pub user_disliked: bool,
}
