//! Optimistic patch engine.
//!
//! Pure functions from a previous cache value (possibly a miss) to the
//! provisional value a mutation should show while its network call is in
//! flight. `None` means "leave this identity alone".

use std::collections::HashSet;
use std::time::Duration;

use plume_core::{Comment, CommentId, Post, PostId, PostUpdate, Profile, ProfileUpdate, Timestamp};

use crate::value::CacheValue;

/// Flip the viewer's like on `post`, moving the count with it.
pub fn flip_like(post: &mut Post) {
    post.is_liked = !post.is_liked;
    post.likes_count = if post.is_liked {
        post.likes_count.saturating_add(1)
    } else {
        post.likes_count.saturating_sub(1)
    };
}

/// Flip the viewer's save flag on `post`. Counts are left to the server.
pub fn flip_save(post: &mut Post) {
    post.is_saved = !post.is_saved;
}

pub fn flip_follow(profile: &mut Profile) {
    profile.is_following = !profile.is_following;
    profile.followers_count = if profile.is_following {
        profile.followers_count.saturating_add(1)
    } else {
        profile.followers_count.saturating_sub(1)
    };
}

fn patch_post_value<F>(previous: Option<&CacheValue>, post_id: &PostId, f: F) -> Option<CacheValue>
where
    F: FnMut(&mut Post),
{
    let mut next = previous?.clone();
    (next.patch_posts(post_id, f) > 0).then_some(next)
}

pub fn toggle_like(previous: Option<&CacheValue>, post_id: &PostId) -> Option<CacheValue> {
    patch_post_value(previous, post_id, flip_like)
}

pub fn toggle_save(previous: Option<&CacheValue>, post_id: &PostId) -> Option<CacheValue> {
    patch_post_value(previous, post_id, flip_save)
}

/// Merge `update` over every copy of the post.
pub fn update_post(
    previous: Option<&CacheValue>,
    post_id: &PostId,
    update: &PostUpdate,
) -> Option<CacheValue> {
    patch_post_value(previous, post_id, |post| *post = update.apply_to(post))
}

/// Flip `is_following` on the profile called `username`.
pub fn toggle_follow(previous: Option<&CacheValue>, username: &str) -> Option<CacheValue> {
    match previous? {
        CacheValue::Profile(profile) if profile.username == username => {
            let mut profile = profile.clone();
            flip_follow(&mut profile);
            Some(CacheValue::Profile(profile))
        }
        CacheValue::Profiles(profiles) if profiles.iter().any(|p| p.username == username) => {
            let mut profiles = profiles.clone();
            profiles
                .iter_mut()
                .filter(|p| p.username == username)
                .for_each(flip_follow);
            Some(CacheValue::Profiles(profiles))
        }
        _ => None,
    }
}

/// Merge the submitted fields over the previous profile.
pub fn update_profile(previous: Option<&CacheValue>, update: &ProfileUpdate) -> Option<CacheValue> {
    match previous? {
        CacheValue::Profile(profile) => Some(CacheValue::Profile(update.apply_to(profile))),
        _ => None,
    }
}

fn comments_of(previous: Option<&CacheValue>) -> Option<Vec<Comment>> {
    match previous {
        None => Some(Vec::new()),
        Some(CacheValue::Comments(comments)) => Some(comments.clone()),
        Some(_) => None,
    }
}

/// Position just past `parent` and all of its descendants, if the parent is listed.
fn reply_slot(comments: &[Comment], parent: &CommentId) -> Option<usize> {
    let start = comments.iter().position(|c| &c.id == parent)?;
    let mut family: HashSet<&CommentId> = HashSet::from([parent]);
    let mut last = start;
    for (index, comment) in comments.iter().enumerate().skip(start + 1) {
        if comment.parent_id.as_ref().is_some_and(|p| family.contains(p)) {
            family.insert(&comment.id);
            last = index;
        }
    }
    Some(last + 1)
}

/// Insert a provisional comment at the end of its parent's reply thread, or at
/// the end of the list for a top-level comment. A missing list starts fresh.
pub fn create_comment(previous: Option<&CacheValue>, comment: &Comment) -> Option<CacheValue> {
    let mut comments = comments_of(previous)?;
    let slot = comment
        .parent_id
        .as_ref()
        .and_then(|parent| reply_slot(&comments, parent))
        .unwrap_or(comments.len());
    comments.insert(slot, comment.clone());
    Some(CacheValue::Comments(comments))
}

pub fn update_comment(
    previous: Option<&CacheValue>,
    comment_id: &CommentId,
    content: &str,
    updated_at: Timestamp,
) -> Option<CacheValue> {
    let CacheValue::Comments(comments) = previous? else {
        return None;
    };
    let mut comments = comments.clone();
    let target = comments.iter_mut().find(|c| &c.id == comment_id)?;
    target.content = content.to_string();
    target.updated_at = updated_at;
    Some(CacheValue::Comments(comments))
}

pub fn delete_comment(previous: Option<&CacheValue>, comment_id: &CommentId) -> Option<CacheValue> {
    let CacheValue::Comments(comments) = previous? else {
        return None;
    };
    let mut comments = comments.clone();
    let before = comments.len();
    comments.retain(|c| &c.id != comment_id);
    (comments.len() != before).then_some(CacheValue::Comments(comments))
}

/// Swap in the server's copy of an existing comment, keeping its position.
pub fn replace_comment(current: Option<&CacheValue>, server: &Comment) -> Option<CacheValue> {
    let CacheValue::Comments(comments) = current? else {
        return None;
    };
    let mut comments = comments.clone();
    let target = comments.iter_mut().find(|c| c.id == server.id)?;
    *target = server.clone();
    Some(CacheValue::Comments(comments))
}

/// Fold a server-confirmed comment into the current list.
///
/// `provisional` is the record this mutation inserted. It is replaced in place
/// when still present. Otherwise the closest optimistic record with the same
/// post, author and content is taken, measured from `provisional.created_at`
/// within `window` (lowest index on ties). A record already carrying the server
/// id wins over both, and the provisional copy is dropped. With no match the
/// server record is appended.
pub fn reconcile_created_comment(
    current: Option<&CacheValue>,
    provisional: &Comment,
    server: &Comment,
    window: Duration,
) -> Option<CacheValue> {
    let mut comments = comments_of(current)?;
    let mut confirmed = server.clone();
    confirmed.optimistic = false;

    if let Some(existing) = comments.iter_mut().find(|c| c.id == confirmed.id) {
        *existing = confirmed;
        comments.retain(|c| c.id != provisional.id);
        return Some(CacheValue::Comments(comments));
    }

    if let Some(own) = comments.iter_mut().find(|c| c.id == provisional.id) {
        *own = confirmed;
        return Some(CacheValue::Comments(comments));
    }

    let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);
    let matched = comments
        .iter()
        .enumerate()
        .filter(|(_, c)| {
            c.optimistic
                && c.id.is_provisional()
                && c.post_id == confirmed.post_id
                && c.author_id == confirmed.author_id
                && c.content == confirmed.content
        })
        .map(|(index, c)| (index, (c.created_at - provisional.created_at).abs()))
        .filter(|(_, distance)| *distance <= window)
        .min_by_key(|(index, distance)| (*distance, *index))
        .map(|(index, _)| index);

    match matched {
        Some(index) => comments[index] = confirmed,
        None => comments.push(confirmed),
    }
    Some(CacheValue::Comments(comments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use plume_core::{PostStatus, ProfileId, RecordId};

    fn post(id: &str, liked: bool, likes: u64) -> Post {
        let now = Utc::now();
        Post {
            id: PostId::new(id),
            author_id: ProfileId::new("author"),
            title: format!("Post {id}"),
            slug: id.to_string(),
            content: String::new(),
            status: PostStatus::Published,
            likes_count: likes,
            comments_count: 0,
            saves_count: 2,
            is_liked: liked,
            is_saved: false,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn comment(id: CommentId, parent: Option<CommentId>, content: &str) -> Comment {
        let now = Utc::now();
        Comment {
            id,
            post_id: PostId::new("p1"),
            parent_id: parent,
            author_id: ProfileId::new("alice"),
            content: content.to_string(),
            created_at: now,
            updated_at: now,
            optimistic: false,
        }
    }

    fn ids(value: &CacheValue) -> Vec<String> {
        value
            .as_comments()
            .unwrap()
            .iter()
            .map(|c| c.id.to_string())
            .collect()
    }

    fn profile(username: &str, following: bool, followers: u64) -> Profile {
        Profile {
            id: ProfileId::new(format!("id-{username}")),
            username: username.to_string(),
            bio: None,
            website: None,
            avatar_url: None,
            links: Vec::new(),
            followers_count: followers,
            following_count: 0,
            is_following: following,
        }
    }

    #[test]
    fn test_toggle_like_flips_and_counts() {
        let value = CacheValue::Post(post("p1", false, 3));
        let liked = toggle_like(Some(&value), &PostId::new("p1")).unwrap();
        let p = liked.as_post().unwrap();
        assert!(p.is_liked);
        assert_eq!(p.likes_count, 4);

        let unliked = toggle_like(Some(&liked), &PostId::new("p1")).unwrap();
        assert_eq!(unliked, value);
    }

    #[test]
    fn test_toggle_like_saturates_at_zero() {
        let value = CacheValue::Post(post("p1", true, 0));
        let next = toggle_like(Some(&value), &PostId::new("p1")).unwrap();
        assert_eq!(next.as_post().unwrap().likes_count, 0);
    }

    #[test]
    fn test_toggle_like_skips_missing_and_unrelated() {
        assert!(toggle_like(None, &PostId::new("p1")).is_none());
        let list = CacheValue::Posts(vec![post("p2", false, 1)]);
        assert!(toggle_like(Some(&list), &PostId::new("p1")).is_none());
    }

    #[test]
    fn test_toggle_save_leaves_counts() {
        let value = CacheValue::Posts(vec![post("p1", false, 3), post("p2", false, 0)]);
        let next = toggle_save(Some(&value), &PostId::new("p1")).unwrap();
        let posts = next.as_posts().unwrap();
        assert!(posts[0].is_saved);
        assert_eq!(posts[0].saves_count, 2);
        assert_eq!(posts[1], value.as_posts().unwrap()[1]);
    }

    #[test]
    fn test_toggle_follow_on_profile_and_list() {
        let single = CacheValue::Profile(profile("bob", false, 10));
        let next = toggle_follow(Some(&single), "bob").unwrap();
        let p = next.as_profile().unwrap();
        assert!(p.is_following);
        assert_eq!(p.followers_count, 11);

        let list = CacheValue::Profiles(vec![profile("carol", true, 1), profile("bob", true, 5)]);
        let next = toggle_follow(Some(&list), "bob").unwrap();
        let profiles = next.as_profiles().unwrap();
        assert!(profiles[0].is_following);
        assert!(!profiles[1].is_following);
        assert_eq!(profiles[1].followers_count, 4);

        assert!(toggle_follow(Some(&single), "nobody").is_none());
    }

    #[test]
    fn test_update_profile_merges() {
        let value = CacheValue::Profile(profile("bob", false, 10));
        let update = ProfileUpdate {
            bio: Some("hello".to_string()),
            ..Default::default()
        };
        let next = update_profile(Some(&value), &update).unwrap();
        let p = next.as_profile().unwrap();
        assert_eq!(p.bio.as_deref(), Some("hello"));
        assert_eq!(p.username, "bob");
        assert_eq!(p.followers_count, 10);
    }

    #[test]
    fn test_update_post_merges_title() {
        let value = CacheValue::Post(post("p1", false, 3));
        let update = PostUpdate {
            title: Some("Renamed".to_string()),
            ..Default::default()
        };
        let next = update_post(Some(&value), &PostId::new("p1"), &update).unwrap();
        assert_eq!(next.as_post().unwrap().title, "Renamed");
        assert_eq!(next.as_post().unwrap().likes_count, 3);
    }

    #[test]
    fn test_create_comment_on_missing_list() {
        let c = comment(RecordId::provisional(1), None, "first");
        let next = create_comment(None, &c).unwrap();
        assert_eq!(ids(&next), vec!["temp-1"]);
    }

    #[test]
    fn test_create_reply_lands_after_parent_thread() {
        let list = CacheValue::Comments(vec![
            comment(RecordId::server("a"), None, "a"),
            comment(RecordId::server("a1"), Some(RecordId::server("a")), "a1"),
            comment(RecordId::server("a1x"), Some(RecordId::server("a1")), "a1x"),
            comment(RecordId::server("b"), None, "b"),
        ]);
        let reply = comment(RecordId::provisional(7), Some(RecordId::server("a")), "new");
        let next = create_comment(Some(&list), &reply).unwrap();
        assert_eq!(ids(&next), vec!["a", "a1", "a1x", "temp-7", "b"]);

        let top = comment(RecordId::provisional(8), None, "top");
        let next = create_comment(Some(&next), &top).unwrap();
        assert_eq!(ids(&next).last().unwrap(), "temp-8");
    }

    #[test]
    fn test_reply_to_unknown_parent_appends() {
        let list = CacheValue::Comments(vec![comment(RecordId::server("a"), None, "a")]);
        let reply = comment(RecordId::provisional(1), Some(RecordId::server("zz")), "r");
        let next = create_comment(Some(&list), &reply).unwrap();
        assert_eq!(ids(&next), vec!["a", "temp-1"]);
    }

    #[test]
    fn test_update_and_delete_touch_only_target() {
        let list = CacheValue::Comments(vec![
            comment(RecordId::server("a"), None, "a"),
            comment(RecordId::server("b"), None, "b"),
        ]);
        let now = Utc::now();
        let next = update_comment(Some(&list), &RecordId::server("b"), "edited", now).unwrap();
        let comments = next.as_comments().unwrap();
        assert_eq!(comments[1].content, "edited");
        assert_eq!(comments[0], list.as_comments().unwrap()[0]);

        let next = delete_comment(Some(&next), &RecordId::server("a")).unwrap();
        assert_eq!(ids(&next), vec!["b"]);
        assert!(delete_comment(Some(&next), &RecordId::server("a")).is_none());
    }

    fn provisional(seq: u64, content: &str) -> Comment {
        let mut c = comment(RecordId::provisional(seq), None, content);
        c.optimistic = true;
        c
    }

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn test_reconcile_replaces_provisional_in_place() {
        let own = provisional(1, "hello");
        let list = CacheValue::Comments(vec![
            comment(RecordId::server("a"), None, "a"),
            own.clone(),
            comment(RecordId::server("b"), None, "b"),
        ]);
        let server = comment(RecordId::server("c100"), None, "hello");

        let next = reconcile_created_comment(Some(&list), &own, &server, WINDOW).unwrap();
        assert_eq!(ids(&next), vec!["a", "c100", "b"]);
        assert!(!next.as_comments().unwrap()[1].optimistic);

        let again = reconcile_created_comment(Some(&next), &own, &server, WINDOW).unwrap();
        assert_eq!(ids(&again), vec!["a", "c100", "b"]);
    }

    #[test]
    fn test_reconcile_identical_content_keeps_insertion_order() {
        let first = provisional(1, "+1");
        let mut second = provisional(2, "+1");
        second.created_at = first.created_at + chrono::Duration::milliseconds(5);
        let list = CacheValue::Comments(vec![first.clone(), second.clone()]);

        // Server stamps land after both provisional records.
        let mut c100 = comment(RecordId::server("c100"), None, "+1");
        c100.created_at = second.created_at + chrono::Duration::seconds(1);
        let mut c101 = comment(RecordId::server("c101"), None, "+1");
        c101.created_at = c100.created_at + chrono::Duration::seconds(1);

        let next = reconcile_created_comment(Some(&list), &first, &c100, WINDOW).unwrap();
        assert_eq!(ids(&next), vec!["c100", "temp-2"]);
        let last = reconcile_created_comment(Some(&next), &second, &c101, WINDOW).unwrap();
        assert_eq!(ids(&last), vec!["c100", "c101"]);
    }

    #[test]
    fn test_reconcile_falls_back_to_closest_provisional_stamp() {
        let base = Utc::now();
        let mut early = provisional(1, "same");
        early.created_at = base - chrono::Duration::seconds(20);
        let mut late = provisional(2, "same");
        late.created_at = base;
        let list = CacheValue::Comments(vec![early.clone(), late]);

        // The mutation's own record is gone; its stamp is nearest `early`.
        let mut own = provisional(9, "same");
        own.created_at = early.created_at + chrono::Duration::seconds(1);
        let mut server = comment(RecordId::server("c1"), None, "same");
        server.created_at = base + chrono::Duration::seconds(1);

        let next = reconcile_created_comment(Some(&list), &own, &server, WINDOW).unwrap();
        assert_eq!(ids(&next), vec!["c1", "temp-2"]);
    }

    #[test]
    fn test_reconcile_ties_prefer_lowest_index() {
        let first = provisional(1, "same");
        let mut second = provisional(2, "same");
        second.created_at = first.created_at;
        let list = CacheValue::Comments(vec![first.clone(), second]);

        let mut own = provisional(9, "same");
        own.created_at = first.created_at;
        let server = comment(RecordId::server("c1"), None, "same");
        let next = reconcile_created_comment(Some(&list), &own, &server, WINDOW).unwrap();
        assert_eq!(ids(&next), vec!["c1", "temp-2"]);
    }

    #[test]
    fn test_reconcile_outside_window_appends() {
        let mut stale = provisional(1, "hello");
        stale.created_at = Utc::now() - chrono::Duration::minutes(10);
        let list = CacheValue::Comments(vec![stale]);
        let own = provisional(2, "hello");
        let server = comment(RecordId::server("c100"), None, "hello");

        let next = reconcile_created_comment(Some(&list), &own, &server, WINDOW).unwrap();
        assert_eq!(ids(&next), vec!["temp-1", "c100"]);
    }

    #[test]
    fn test_reconcile_drops_provisional_when_server_copy_present() {
        let own = provisional(1, "hello");
        let list = CacheValue::Comments(vec![
            comment(RecordId::server("c100"), None, "hello"),
            own.clone(),
        ]);
        let server = comment(RecordId::server("c100"), None, "hello");

        let next = reconcile_created_comment(Some(&list), &own, &server, WINDOW).unwrap();
        assert_eq!(ids(&next), vec!["c100"]);
    }

    #[test]
    fn test_replace_comment_keeps_position() {
        let list = CacheValue::Comments(vec![
            comment(RecordId::server("a"), None, "a"),
            comment(RecordId::server("b"), None, "b"),
        ]);
        let server = comment(RecordId::server("a"), None, "server text");
        let next = replace_comment(Some(&list), &server).unwrap();
        assert_eq!(next.as_comments().unwrap()[0].content, "server text");
        assert_eq!(ids(&next), vec!["a", "b"]);
    }
}
