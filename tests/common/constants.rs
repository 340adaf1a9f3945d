//! Names and credentials used across the test suite.

pub const TEST_PASS: &str = "testpass123";
pub const NEW_PASS: &str = "brandnew456";

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const USER_EMAIL: &str = "ada@example.com";
pub const OTHER_USER_EMAIL: &str = "grace@example.com";

pub const ARTIST_NAME: &str = "Ada";
pub const OTHER_ARTIST_NAME: &str = "Babbage";
pub const ALBUM_NAME: &str = "Constants";
pub const OTHER_ALBUM_NAME: &str = "Engines";
pub const TRACK_NAMES: [&str; 3] = ["Bernoulli", "Notes", "Loops"];
