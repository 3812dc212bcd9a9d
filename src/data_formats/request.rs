use serde::{Deserialize, Serialize};

// ----------------- Session Requests -----------------
#[derive(Deserialize, Serialize, Debug)]
pub struct LoginRequest {
    pub password: String,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

// ----------------- Post Requests -----------------

/// The write/edit form as posted by the browser. `is_page` is a checkbox and
/// is only present when ticked.
#[derive(Deserialize, Serialize, Debug, Default)]
pub struct PostForm {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub is_page: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    /// Empty means "generate one from the current time".
    pub slug: String,
    pub is_page: bool,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PostUpdate {
    pub title: String,
    pub content: String,
    pub is_page: bool,
    pub tags: Vec<String>,
}

impl From<PostForm> for NewPost {
    fn from(form: PostForm) -> Self {
        NewPost {
            title: form.title.trim().to_owned(),
            slug: form.slug.unwrap_or_default().trim().to_owned(),
            is_page: form.is_page.is_some(),
            tags: parse_tag_list(&form.tags),
            content: form.content,
        }
    }
}

impl From<PostForm> for PostUpdate {
    fn from(form: PostForm) -> Self {
        PostUpdate {
            title: form.title.trim().to_owned(),
            is_page: form.is_page.is_some(),
            tags: parse_tag_list(&form.tags),
            content: form.content,
        }
    }
}

/// Splits a comma separated tag list, trimming names and dropping empty and
/// repeated entries. Order of first appearance is kept.
pub fn parse_tag_list(tags: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in tags.split(',').map(str::trim) {
        if !name.is_empty() && !names.iter().any(|existing| existing == name) {
            names.push(name.to_owned());
        }
    }
    names
}
