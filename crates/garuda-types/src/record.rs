//! The per-user record and its in-memory mutations.
//!
//! A [`UserRecord`] folds credentials, posts and the following set into one
//! value. The store reads it, applies exactly one of the mutations below to a
//! local copy, and writes the whole record back.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RecordError, Result};
use crate::names::Username;

/// A single post. Titles are not unique within a record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub title: String,
    pub content: String,
}

impl Post {
    /// Create a new post.
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

/// Everything stored for one user.
///
/// Invariants upheld by every method:
/// - `following` never contains `username`.
/// - `posts` stay in insertion order; removal keeps the order of the rest.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    username: Username,
    password_hash: String,
    posts: Vec<Post>,
    following: BTreeSet<Username>,
}

impl UserRecord {
    /// A fresh record with no posts and no followees.
    pub fn new(username: Username, password_hash: impl Into<String>) -> Self {
        Self {
            username,
            password_hash: password_hash.into(),
            posts: Vec::new(),
            following: BTreeSet::new(),
        }
    }

    pub fn username(&self) -> &Username {
        &self.username
    }

    /// The opaque credential material. Never log this.
    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    /// Iterate over the users this record follows.
    ///
    /// Callers must not rely on the iteration order.
    pub fn following(&self) -> impl Iterator<Item = &Username> + '_ {
        self.following.iter()
    }

    pub fn following_count(&self) -> usize {
        self.following.len()
    }

    pub fn is_following(&self, followee: &Username) -> bool {
        self.following.contains(followee)
    }

    /// Replace the credential, leaving posts and following untouched.
    pub fn set_password_hash(&mut self, password_hash: impl Into<String>) {
        self.password_hash = password_hash.into();
    }

    /// Append a post at the end. Duplicate titles are allowed.
    pub fn append_post(&mut self, title: impl Into<String>, content: impl Into<String>) {
        self.posts.push(Post::new(title, content));
    }

    /// Replace the content of the first post with `title`.
    ///
    /// Later posts sharing the title are left alone.
    pub fn update_post(&mut self, title: &str, content: impl Into<String>) -> Result<()> {
        let post = self
            .posts
            .iter_mut()
            .find(|p| p.title == title)
            .ok_or_else(|| RecordError::PostNotFound {
                title: title.to_string(),
            })?;
        post.content = content.into();
        Ok(())
    }

    /// Remove the first post with `title`, returning it.
    pub fn remove_post(&mut self, title: &str) -> Result<Post> {
        let idx = self
            .posts
            .iter()
            .position(|p| p.title == title)
            .ok_or_else(|| RecordError::PostNotFound {
                title: title.to_string(),
            })?;
        Ok(self.posts.remove(idx))
    }

    /// Add a directed edge `self -> followee`.
    pub fn follow(&mut self, followee: Username) -> Result<()> {
        if followee == self.username {
            return Err(RecordError::SelfFollow {
                username: followee.into_inner(),
            });
        }
        if self.following.contains(&followee) {
            return Err(RecordError::AlreadyFollowing {
                followee: followee.into_inner(),
            });
        }
        self.following.insert(followee);
        Ok(())
    }

    /// Remove the edge `self -> followee`.
    pub fn unfollow(&mut self, followee: &Username) -> Result<()> {
        if !self.following.remove(followee) {
            return Err(RecordError::FollowingNotFound {
                followee: followee.to_string(),
            });
        }
        Ok(())
    }

    /// Check the structural invariants of a decoded record.
    ///
    /// A record built only through this type's methods always passes; records
    /// decoded from foreign bytes might not.
    pub fn check_invariants(&self) -> Result<()> {
        if self.following.contains(&self.username) {
            return Err(RecordError::SelfFollow {
                username: self.username.to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserRecord")
            .field("username", &self.username)
            .field("password_hash", &"<redacted>")
            .field("posts", &self.posts.len())
            .field("following", &self.following.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn user(name: &str) -> Username {
        Username::new(name).unwrap()
    }

    fn record() -> UserRecord {
        UserRecord::new(user("alice"), "h1")
    }

    fn titles(r: &UserRecord) -> Vec<(&str, &str)> {
        r.posts()
            .iter()
            .map(|p| (p.title.as_str(), p.content.as_str()))
            .collect()
    }

    #[test]
    fn new_record_is_empty() {
        let r = record();
        assert_eq!(r.username(), &user("alice"));
        assert_eq!(r.password_hash(), "h1");
        assert!(r.posts().is_empty());
        assert_eq!(r.following_count(), 0);
    }

    #[test]
    fn duplicate_titles_keep_order() {
        let mut r = record();
        r.append_post("T", "C");
        r.append_post("T", "C2");
        assert_eq!(titles(&r), vec![("T", "C"), ("T", "C2")]);
    }

    #[test]
    fn update_touches_first_match_only() {
        let mut r = record();
        r.append_post("T", "C");
        r.append_post("T", "C2");
        r.update_post("T", "C3").unwrap();
        assert_eq!(titles(&r), vec![("T", "C3"), ("T", "C2")]);
    }

    #[test]
    fn update_missing_title() {
        let mut r = record();
        let err = r.update_post("nope", "x").unwrap_err();
        assert_eq!(
            err,
            RecordError::PostNotFound {
                title: "nope".into()
            }
        );
    }

    #[test]
    fn remove_first_match_preserves_rest() {
        let mut r = record();
        r.append_post("A", "1");
        r.append_post("T", "2");
        r.append_post("B", "3");
        r.append_post("T", "4");
        let removed = r.remove_post("T").unwrap();
        assert_eq!(removed, Post::new("T", "2"));
        assert_eq!(titles(&r), vec![("A", "1"), ("B", "3"), ("T", "4")]);
        assert!(matches!(
            r.remove_post("Z"),
            Err(RecordError::PostNotFound { .. })
        ));
    }

    #[test]
    fn follow_rules() {
        let mut r = record();
        assert!(matches!(
            r.follow(user("alice")),
            Err(RecordError::SelfFollow { .. })
        ));
        r.follow(user("bob")).unwrap();
        assert!(r.is_following(&user("bob")));
        assert!(matches!(
            r.follow(user("bob")),
            Err(RecordError::AlreadyFollowing { .. })
        ));
        r.unfollow(&user("bob")).unwrap();
        assert!(matches!(
            r.unfollow(&user("bob")),
            Err(RecordError::FollowingNotFound { .. })
        ));
    }

    #[test]
    fn set_password_keeps_other_fields() {
        let mut r = record();
        r.append_post("T", "C");
        r.follow(user("bob")).unwrap();
        r.set_password_hash("h2");
        assert_eq!(r.password_hash(), "h2");
        assert_eq!(r.posts().len(), 1);
        assert_eq!(r.following_count(), 1);
    }

    #[test]
    fn debug_redacts_password() {
        let r = UserRecord::new(user("alice"), "super-secret-hash");
        let rendered = format!("{r:?}");
        assert!(!rendered.contains("super-secret-hash"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn invariants_catch_self_follow_in_foreign_data() {
        let json = r#"{"username":"alice","password_hash":"h","posts":[],"following":["alice"]}"#;
        let r: UserRecord = serde_json::from_str(json).unwrap();
        assert!(r.check_invariants().is_err());
    }

    proptest! {
        #[test]
        fn remove_post_keeps_relative_order(
            titles in proptest::collection::vec("[a-c]", 0..12),
            target in "[a-c]",
        ) {
            let mut r = record();
            for (i, t) in titles.iter().enumerate() {
                r.append_post(t.clone(), i.to_string());
            }

            let mut expected: Vec<Post> = r.posts().to_vec();
            let first = expected.iter().position(|p| p.title == target);

            match (r.remove_post(&target), first) {
                (Ok(removed), Some(idx)) => {
                    prop_assert_eq!(removed, expected.remove(idx));
                }
                (Err(_), None) => {}
                (res, idx) => prop_assert!(false, "unexpected {:?} for {:?}", res, idx),
            }
            prop_assert_eq!(r.posts(), expected.as_slice());
        }
    }
}
