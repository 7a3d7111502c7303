/// Web link to a test's folder in a gitweb-style repository browser.
///
/// # Arguments
///
/// * `web_url` - Repository browser URL (e.g., <https://git.example.com/cgit/tests>)
/// * `folder` - Test folder within the repository (e.g., "bash/Sanity/smoke")
///
/// # Returns
///
/// Clickable URL to the folder at `HEAD`
/// (e.g., <https://git.example.com/cgit/tests/tree/HEAD:/bash/Sanity/smoke>)
pub fn test_tree_url(web_url: &str, folder: &str) -> String {
    format!(
        "{}/tree/HEAD:/{}",
        web_url.trim_end_matches('/'),
        folder.trim_start_matches('/')
    )
}

/// Web link to the diff of one commit.
pub fn commit_url(web_url: &str, hash: &str) -> String {
    format!("{}/commitdiff/{}", web_url.trim_end_matches('/'), hash.trim())
}
