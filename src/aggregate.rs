// src/aggregate.rs
// =============================================================================
// Collects what the workers find into the two output datasets.
//
// - Posts are keyed by (owner_id, post_id). The same post can come back from
//   two windows or two queries; the first one seen wins.
// - Comments are keyed by (owner_id, post_id, comment_id) for the same reason.
// - A comment whose post never made it into the post set is kept anyway and
//   flagged `orphaned` in the output rather than silently dropped.
//
// Only the dispatcher's result loop touches the aggregator, so it needs no
// locking of its own.
// =============================================================================

use crate::model::{Comment, Post, PostKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One row of the posts dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub owner_id: i64,
    pub post_id: i64,
    pub url: String,
    /// The query that first matched this post
    pub query: String,
    pub author_id: Option<i64>,
    pub published_at: DateTime<Utc>,
    pub text: String,
    pub likes: u64,
    pub reposts: u64,
    pub views: u64,
    pub comment_count: u64,
}

/// One row of the comments dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub owner_id: i64,
    pub post_id: i64,
    pub comment_id: i64,
    pub author_id: i64,
    pub published_at: DateTime<Utc>,
    pub text: String,
    pub likes: u64,
    /// True when the parent post is not in the posts dataset
    pub orphaned: bool,
}

/// Both datasets, ready for export
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Datasets {
    pub posts: Vec<PostRecord>,
    pub comments: Vec<CommentRecord>,
}

/// Headline numbers for a finished crawl
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DatasetSummary {
    pub posts: usize,
    pub comments: usize,
    pub orphaned_comments: usize,
    pub mean_post_likes: f64,
    pub mean_post_reposts: f64,
    pub mean_post_views: f64,
    pub mean_comment_likes: f64,
}

fn mean(values: impl ExactSizeIterator<Item = u64>) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    values.sum::<u64>() as f64 / n as f64
}

impl Datasets {
    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            posts: self.posts.len(),
            comments: self.comments.len(),
            orphaned_comments: self.comments.iter().filter(|c| c.orphaned).count(),
            mean_post_likes: mean(self.posts.iter().map(|p| p.likes)),
            mean_post_reposts: mean(self.posts.iter().map(|p| p.reposts)),
            mean_post_views: mean(self.posts.iter().map(|p| p.views)),
            mean_comment_likes: mean(self.comments.iter().map(|c| c.likes)),
        }
    }
}

pub fn post_url(key: PostKey) -> String {
    format!("https://vk.com/wall{}_{}", key.owner_id, key.post_id)
}

#[derive(Debug, Default)]
pub struct ResultAggregator {
    post_index: HashMap<PostKey, usize>,
    posts: Vec<(Post, String)>,
    comment_keys: HashSet<(PostKey, i64)>,
    comments: Vec<Comment>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a post unless it's already known. Returns true if it was new.
    pub fn add_post(&mut self, post: Post, query: &str) -> bool {
        let key = post.key();
        if self.post_index.contains_key(&key) {
            return false;
        }
        self.post_index.insert(key, self.posts.len());
        self.posts.push((post, query.to_string()));
        true
    }

    /// Adds comments for one post, skipping ones already seen. Returns how many were new.
    ///
    /// The parent is taken from the arguments, not from each comment.
    pub fn add_comments(&mut self, owner_id: i64, post_id: i64, comments: Vec<Comment>) -> usize {
        let parent = PostKey { owner_id, post_id };
        let mut added = 0;
        for mut comment in comments {
            comment.owner_id = owner_id;
            comment.post_id = post_id;
            if self.comment_keys.insert((parent, comment.comment_id)) {
                self.comments.push(comment);
                added += 1;
            }
        }
        added
    }

    pub fn contains_post(&self, key: &PostKey) -> bool {
        self.post_index.contains_key(key)
    }

    pub fn post_count(&self) -> usize {
        self.posts.len()
    }

    pub fn comment_count(&self) -> usize {
        self.comments.len()
    }

    /// Consistent copy of both datasets, in first-seen order
    pub fn snapshot(&self) -> Datasets {
        let posts = self
            .posts
            .iter()
            .map(|(post, query)| PostRecord {
                owner_id: post.owner_id,
                post_id: post.post_id,
                url: post_url(post.key()),
                query: query.clone(),
                author_id: post.author_id,
                published_at: post.published_at,
                text: post.text.clone(),
                likes: post.likes,
                reposts: post.reposts,
                views: post.views,
                comment_count: post.comment_count,
            })
            .collect();

        let comments = self
            .comments
            .iter()
            .map(|c| CommentRecord {
                owner_id: c.owner_id,
                post_id: c.post_id,
                comment_id: c.comment_id,
                author_id: c.author_id,
                published_at: c.published_at,
                text: c.text.clone(),
                likes: c.likes,
                orphaned: !self.post_index.contains_key(&c.parent()),
            })
            .collect();

        Datasets { posts, comments }
    }
}
