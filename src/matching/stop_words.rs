//! Words ignored when comparing titles and hosts in fuzzy matching.
//!
//! Generic terms and host noise would otherwise make unrelated credentials
//! look similar ("My Account", "login.example.com").

pub static STOP_WORDS: &[&str] = &[
    // Authentication
    "login", "signin", "sign", "register", "signup", "account", "accounts",
    "password", "access", "auth", "session", "logout", "signout",

    // Site sections
    "portal", "dashboard", "home", "welcome", "page", "site", "secure",
    "member", "user", "profile", "settings", "main",

    // Generic descriptors
    "online", "mobile", "personal", "private", "default", "website",
    "service", "services", "official",

    // Host noise
    "http", "https", "android", "debug", "release",
];

/// Lower-cased alphanumeric words longer than three characters that are not
/// stop words.
pub fn meaningful_words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() > 3 && !STOP_WORDS.contains(word))
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meaningful_words_drop_noise() {
        assert_eq!(meaningful_words("https://accounts.google.com/login"), vec!["google"]);
        assert_eq!(meaningful_words("My GitHub Account"), vec!["github"]);
        assert!(meaningful_words("www.x.io").is_empty());
    }
}
