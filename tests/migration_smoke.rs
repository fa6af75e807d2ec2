//! Structural checks on the users migration, without a live database.

const MIGRATION_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/migrations/0001_create_users.sql");

fn read_migration() -> String {
    std::fs::read_to_string(MIGRATION_PATH).expect("migration file should exist")
}

#[test]
fn migration_file_exists_and_is_nonempty() {
    let sql = read_migration();
    assert!(!sql.trim().is_empty());
}

#[test]
fn users_table_has_autoincrement_primary_key() {
    let sql = read_migration();
    assert!(sql.contains("CREATE TABLE users"));
    assert!(sql.contains("AUTO_INCREMENT"));
    assert!(sql.contains("PRIMARY KEY"));
}

#[test]
fn users_table_has_unique_username_and_email() {
    let sql = read_migration();
    assert!(sql.contains("UNIQUE KEY users_username_key (username)"));
    assert!(sql.contains("UNIQUE KEY users_email_key (email)"));
}

#[test]
fn users_table_stores_a_password_hash_column() {
    let sql = read_migration();
    assert!(sql.contains("password VARCHAR"));
}
