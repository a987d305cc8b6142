//! Basic Store: keep users in a file, encode their passwords, store profiles.
//!
//! Run with:
//!   cargo run --example basic_store -p secstore

use secstore::{
    ObjectStore, Profile, PropertyCollection, PropertyDefinition, PropertyValue, SecurityConfig,
    User,
};

fn main() -> secstore::Result<()> {
    let dir = std::env::temp_dir().join("secstore-example");
    let config = SecurityConfig::default();

    // ── 1. Register a user ──────────────────────────────────────────────────
    //
    // The store creates the file on first save. `update` holds the store lock
    // for the whole read-modify-write.
    let users: ObjectStore<Vec<User>> =
        ObjectStore::with_options(dir.join("users.json"), config.store.clone())?;
    let credentials = config.credential_codec(None)?;

    users.update(|all| -> secstore::Result<()> {
        all.retain(|u| !u.name_matches("alice", config.case_sensitive));
        let mut alice = User::new("alice");
        alice.set_credential(credentials.encode("correct horse", None)?);
        all.push(alice);
        Ok(())
    })??;
    println!("Users file: {}", dir.join("users.json").display());

    // ── 2. Check a login ────────────────────────────────────────────────────
    let ok = users.with_value(|all| -> secstore::Result<bool> {
        let alice = &all[all.len() - 1];
        credentials.verify("correct horse", &alice.password, &alice.password_salt)
    })??;
    println!("  alice login: {}", if ok { "accepted" } else { "rejected" });

    // ── 3. Persist profile properties ───────────────────────────────────────
    let mut props = PropertyCollection::from_definitions(vec![
        PropertyDefinition::string("Theme"),
        PropertyDefinition::binary("Avatar"),
    ])?;
    props.set("Theme", Some("dark".into()))?;
    props.set("Avatar", Some(PropertyValue::Binary(vec![0x89, b'P', b'N', b'G'])))?;

    let codec = config.profile_codec();
    let mut profile = Profile::new("alice");
    profile.store_properties(&codec, &props, true);
    println!("  profile names: {}", profile.encoded().names_text()?);

    let mut restored = PropertyCollection::from_definitions(vec![
        PropertyDefinition::string("Theme"),
        PropertyDefinition::binary("Avatar"),
    ])?;
    let report = profile.load_properties(&codec, &mut restored);
    println!("  restored {} properties", report.applied);

    Ok(())
}
