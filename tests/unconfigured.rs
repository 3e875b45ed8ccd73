//! The process-wide store must be initialized before authenticators exist
//!
//! Kept in its own test binary: the store slot is process-wide, and the
//! not-yet-initialized assertions only hold before any other test calls
//! `CredentialsStore::init`.

use hubctl_auth::{AuthError, ClientIdProvider, CredentialsStore, LoginAuthenticator};

#[test]
fn constructing_an_authenticator_before_init_fails() {
    assert!(matches!(
        CredentialsStore::shared(),
        Err(AuthError::NotConfigured)
    ));

    let err = match LoginAuthenticator::new("myProfile", ClientIdProvider::default()) {
        Ok(_) => panic!("construction must fail before init"),
        Err(err) => err,
    };
    assert!(matches!(err, AuthError::NotConfigured));
    assert!(err.to_string().contains("credentials file not set"));

    // Any profile/provider input fails the same way
    assert!(LoginAuthenticator::new("", ClientIdProvider::default()).is_err());

    // After init, construction succeeds against the installed store
    let dir = tempfile::tempdir().unwrap();
    let store = CredentialsStore::init(dir.path().join("credentials.json"));
    assert_eq!(store.path(), dir.path().join("credentials.json"));

    let authenticator =
        LoginAuthenticator::new("myProfile", ClientIdProvider::default()).unwrap();
    assert_eq!(authenticator.profile(), "myProfile");

    // Re-init points the process at a fresh location (test isolation)
    let other = tempfile::tempdir().unwrap();
    CredentialsStore::init(other.path().join("credentials.json"));
    assert_eq!(
        CredentialsStore::shared().unwrap().path(),
        other.path().join("credentials.json")
    );
}
