pub const SCHEMA: &str = r#"
-- Content sources
CREATE TABLE IF NOT EXISTS publics (
    id TEXT PRIMARY KEY,
    domain TEXT NOT NULL UNIQUE
);

-- Harvested posts
CREATE TABLE IF NOT EXISTS posts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    public_id TEXT NOT NULL,
    remote_id TEXT NOT NULL,
    date TEXT NOT NULL,          -- 'YYYY-MM-DD HH:MM:SS'
    text TEXT,
    comments INTEGER,
    likes INTEGER,
    reposts INTEGER,
    views INTEGER,
    UNIQUE (public_id, remote_id),
    FOREIGN KEY (public_id) REFERENCES publics(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_posts_public ON posts(public_id);
CREATE INDEX IF NOT EXISTS idx_posts_date ON posts(date);

-- Pictures ("memes") of a post
CREATE TABLE IF NOT EXISTS pictures (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    post_id INTEGER NOT NULL,
    idx INTEGER,                 -- NULL when the post has a single picture
    picture BLOB NOT NULL,       -- JPEG
    width INTEGER NOT NULL,
    height INTEGER NOT NULL,
    crop_positions TEXT,         -- JSON array of {"x": [x1, x2], "y": [y1, y2]}
    FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_pictures_post ON pictures(post_id);

-- Text regions cut out of a picture
CREATE TABLE IF NOT EXISTS crops (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    picture_id INTEGER NOT NULL,
    idx INTEGER NOT NULL,
    picture BLOB NOT NULL,       -- JPEG
    text TEXT,
    FOREIGN KEY (picture_id) REFERENCES pictures(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_crops_picture ON crops(picture_id);

-- Provenance of produced composites
CREATE TABLE IF NOT EXISTS generated_posts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    base_post_id INTEGER NOT NULL,
    signature TEXT NOT NULL,     -- sha256 over base post and ordered crop ids
    strategy TEXT NOT NULL,
    posted INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (base_post_id) REFERENCES posts(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_generated_posts_signature ON generated_posts(signature);

CREATE TABLE IF NOT EXISTS generated_pictures (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    generated_post_id INTEGER NOT NULL,
    base_picture_id INTEGER NOT NULL,
    idx INTEGER,
    picture BLOB NOT NULL,
    FOREIGN KEY (generated_post_id) REFERENCES generated_posts(id) ON DELETE CASCADE,
    FOREIGN KEY (base_picture_id) REFERENCES pictures(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS generated_crops (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    generated_picture_id INTEGER NOT NULL,
    crop_id INTEGER NOT NULL,
    idx INTEGER NOT NULL,
    FOREIGN KEY (generated_picture_id) REFERENCES generated_pictures(id) ON DELETE CASCADE,
    FOREIGN KEY (crop_id) REFERENCES crops(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_generated_crops_crop ON generated_crops(crop_id);
"#;

/// Explicit crop geometry, added after the first schema revision.
/// Each statement fails harmlessly once applied.
pub const MIGRATIONS: &[&str] = &[
    "ALTER TABLE crops ADD COLUMN x INTEGER",
    "ALTER TABLE crops ADD COLUMN y INTEGER",
    "ALTER TABLE crops ADD COLUMN width INTEGER",
    "ALTER TABLE crops ADD COLUMN height INTEGER",
];
