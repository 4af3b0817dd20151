use std::path::Path;
use crate::errors::Result;
use log::info;

/// Sanitizes a filename by removing invalid characters
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Sanitizes track filename in "Artist - Title" format
pub fn sanitize_track_filename(artist: &str, title: &str) -> String {
    let sanitized_artist = sanitize_filename(artist);
    let sanitized_title = sanitize_filename(title);
    format!("{} - {}", sanitized_artist, sanitized_title)
}

/// Escapes a literal so yt-dlp's output template does not treat `%` as a field.
pub fn escape_output_template(literal: &str) -> String {
    literal.replace('%', "%%")
}

/// Creates a directory if it doesn't exist
pub async fn ensure_dir_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        tokio::fs::create_dir_all(path).await?;
        info!("Created directory: {:?}", path);
    }
    Ok(())
}

/// Generates a unique ID for jobs and pending links
pub fn generate_job_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Log tag identifying who a job belongs to, e.g. `alice_1234`.
pub fn user_tag(user_name: &str, user_id: i64) -> String {
    format!("{}_{}", user_name, user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_path_separators() {
        assert_eq!(sanitize_track_filename("AC/DC", "T.N.T?"), "AC_DC - T.N.T_");
    }

    #[test]
    fn percent_signs_are_doubled_in_templates() {
        assert_eq!(escape_output_template("100% Hits - 50%"), "100%% Hits - 50%%");
    }

    #[test]
    fn job_ids_are_compact_and_unique() {
        let a = generate_job_id();
        let b = generate_job_id();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}
