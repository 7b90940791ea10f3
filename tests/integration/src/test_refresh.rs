//! Secret refresh integration tests.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use s3vfs_core::S3FileSystem;
    use s3vfs_secrets::{CreateSecretInput, SecretError, StaticEnvironment};

    use crate::{FakeS3, filesystem};

    const URL: &str = "s3://bucket/metrics.csv";

    fn rotated_setup() -> (Arc<FakeS3>, Arc<StaticEnvironment>, S3FileSystem) {
        let fake = FakeS3::new();
        fake.allow("AKIDNEW", "new-secret");
        fake.insert_object(URL, Bytes::from_static(b"ts,value\n"));
        let env = Arc::new(
            StaticEnvironment::new()
                .with("AWS_ACCESS_KEY_ID", "AKIDOLD")
                .with("AWS_SECRET_ACCESS_KEY", "old-secret"),
        );
        let fs = filesystem(&fake, Arc::clone(&env));
        (fake, env, fs)
    }

    fn chain_secret(refresh: bool) -> CreateSecretInput {
        let input = CreateSecretInput::builder()
            .secret_type("s3")
            .provider("credential_chain")
            .name("chain")
            .build();
        if refresh {
            input.with_option("refresh", "auto")
        } else {
            input
        }
    }

    fn key_id(fs: &S3FileSystem) -> String {
        fs.secrets()
            .get("chain")
            .and_then(|entry| entry.secret.get_str("key_id").map(ToOwned::to_owned))
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_should_refresh_rotated_credentials_and_retry() {
        let (fake, env, fs) = rotated_setup();
        fs.secrets().create_secret(&chain_secret(true)).unwrap();
        env.set("AWS_ACCESS_KEY_ID", "AKIDNEW");
        env.set("AWS_SECRET_ACCESS_KEY", "new-secret");

        let body = fs.get(URL).await.unwrap();

        assert_eq!(&body[..], b"ts,value\n");
        assert_eq!(fake.rejected(), 1);
        assert_eq!(key_id(&fs), "AKIDNEW");
    }

    #[tokio::test]
    async fn test_should_retry_only_once_when_refreshed_credentials_fail() {
        let (fake, env, fs) = rotated_setup();
        fs.secrets().create_secret(&chain_secret(true)).unwrap();
        env.set("AWS_ACCESS_KEY_ID", "AKIDSTALE");

        let err = fs.get(URL).await.unwrap_err();

        assert!(err.is_auth_failure());
        assert_eq!(fake.rejected(), 2);
        assert_eq!(key_id(&fs), "AKIDSTALE");
    }

    #[tokio::test]
    async fn test_should_not_retry_without_refresh() {
        let (fake, env, fs) = rotated_setup();
        fs.secrets().create_secret(&chain_secret(false)).unwrap();
        env.set("AWS_ACCESS_KEY_ID", "AKIDNEW");
        env.set("AWS_SECRET_ACCESS_KEY", "new-secret");

        let err = fs.get(URL).await.unwrap_err();

        assert!(err.is_auth_failure());
        assert_eq!(fake.rejected(), 1);
        assert_eq!(key_id(&fs), "AKIDOLD");
    }

    #[tokio::test]
    async fn test_should_refresh_during_multipart_initiation() {
        let (fake, env, fs) = rotated_setup();
        fs.secrets().create_secret(&chain_secret(true)).unwrap();
        env.set("AWS_ACCESS_KEY_ID", "AKIDNEW");
        env.set("AWS_SECRET_ACCESS_KEY", "new-secret");

        let mut handle = fs.open_write("s3://bucket/out.csv").await.unwrap();
        handle.write(b"a,b\n", 0).await.unwrap();
        handle.finalize().await.unwrap();

        assert_eq!(fake.rejected(), 1);
        assert_eq!(&fake.object("s3://bucket/out.csv").unwrap()[..], b"a,b\n");
    }

    #[test]
    fn test_should_reject_refresh_combined_with_refresh_info() {
        let (_fake, _env, fs) = rotated_setup();
        let input = chain_secret(true).with_option(
            "refresh_info",
            std::collections::BTreeMap::<String, String>::new(),
        );

        let err = fs.secrets().create_secret(&input).unwrap_err();
        assert!(matches!(err, SecretError::InvalidOption(_)));
    }
}
