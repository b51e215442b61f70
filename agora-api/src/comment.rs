//! Comment threads.
//!
//! Comments reference each other by id only. A reply can only be attached
//! under a comment that is already stored, and nothing is ever re-parented,
//! so the parent links always form a forest rooted at each post's top-level
//! list.

use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use crate::{validate_required, Error, PostId, Time, User, UserId, DELETED_USER_PLACEHOLDER};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct CommentId(pub Uuid);

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Comment {
    pub id: CommentId,
    pub text: String,
    pub author: UserId,
    pub post: PostId,

    /// `None` for top-level comments
    pub parent: Option<CommentId>,

    /// Replies, in reply order
    pub children: Vec<CommentId>,

    pub date: Time,
}

#[derive(Clone, Debug, Default, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct NewComment {
    pub text: String,
    pub parent: Option<CommentId>,
}

impl NewComment {
    pub fn new(text: String, parent: Option<CommentId>) -> NewComment {
        NewComment { text, parent }
    }

    pub fn validate(&self) -> Result<(), Error> {
        validate_required("text", &self.text)
    }

    pub fn into_comment(self, author: UserId, post: PostId) -> Comment {
        Comment {
            id: CommentId(Uuid::new_v4()),
            text: self.text,
            author,
            post,
            parent: self.parent,
            children: Vec::new(),
            date: Utc::now(),
        }
    }
}

/// The single list a new comment's id gets appended to
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReplyTarget {
    /// The post's top-level comment list
    Post(PostId),
    /// The child list of an existing comment
    Comment(CommentId),
}

impl Comment {
    pub fn reply_target(&self) -> ReplyTarget {
        match self.parent {
            None => ReplyTarget::Post(self.post),
            Some(parent) => ReplyTarget::Comment(parent),
        }
    }
}

/// Links `child` under `parent`, or at the end of `top_level` when there is
/// no parent.
///
/// Exactly one list is modified. Fails without touching anything if `parent`
/// is not in `comments`.
pub fn attach_reply(
    parent: Option<CommentId>,
    child: CommentId,
    top_level: &mut Vec<CommentId>,
    comments: &mut HashMap<CommentId, Comment>,
) -> Result<(), Error> {
    match parent {
        None => top_level.push(child),
        Some(parent) => comments
            .get_mut(&parent)
            .ok_or_else(|| Error::not_found("parent comment"))?
            .children
            .push(child),
    }
    Ok(())
}

/// Depth-first walk over a comment forest, yielding each comment with its
/// depth (0 for roots).
///
/// Children come right after their parent, in insertion order. Ids missing
/// from the map are skipped along with anything below them.
#[derive(Clone, Debug)]
pub struct ThreadWalk<'a> {
    comments: &'a HashMap<CommentId, Comment>,
    stack: Vec<(CommentId, usize)>,
}

pub fn walk_thread<'a>(
    roots: &[CommentId],
    comments: &'a HashMap<CommentId, Comment>,
) -> ThreadWalk<'a> {
    ThreadWalk {
        comments,
        stack: roots.iter().rev().map(|id| (*id, 0)).collect(),
    }
}

impl<'a> Iterator for ThreadWalk<'a> {
    type Item = (&'a Comment, usize);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((id, depth)) = self.stack.pop() {
            match self.comments.get(&id) {
                Some(c) => {
                    self.stack
                        .extend(c.children.iter().rev().map(|id| (*id, depth + 1)));
                    return Some((c, depth));
                }
                None => tracing::warn!(?id, "comment thread references a missing comment"),
            }
        }
        None
    }
}

/// A comment flattened out of its thread, ready to be displayed
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ThreadEntry {
    pub id: CommentId,
    pub parent: Option<CommentId>,
    pub author: UserId,
    pub author_name: String,
    pub text: String,
    pub date: Time,
    pub depth: usize,
}

pub fn display_name(users: &HashMap<UserId, User>, id: UserId) -> String {
    users
        .get(&id)
        .map(|u| u.username.clone())
        .unwrap_or_else(|| String::from(DELETED_USER_PLACEHOLDER))
}

pub fn flatten_thread(
    roots: &[CommentId],
    comments: &HashMap<CommentId, Comment>,
    users: &HashMap<UserId, User>,
) -> Vec<ThreadEntry> {
    walk_thread(roots, comments)
        .map(|(c, depth)| ThreadEntry {
            id: c.id,
            parent: c.parent,
            author: c.author,
            author_name: display_name(users, c.author),
            text: c.text.clone(),
            date: c.date,
            depth,
        })
        .collect()
}
