//! Single-object integration tests.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use s3vfs_core::S3FsError;
    use s3vfs_secrets::StaticEnvironment;

    use crate::{FakeS3, credentials, filesystem};

    #[tokio::test]
    async fn test_should_put_head_get_and_remove_object() {
        let fake = FakeS3::new();
        let fs = filesystem(&fake, credentials(&fake));
        let url = "s3://bucket/data/report 2024.csv";

        fs.put(url, Bytes::from_static(b"id,value\n1,2\n"))
            .await
            .unwrap();

        let meta = fs.head(url).await.unwrap();
        assert_eq!(meta.size, 13);
        assert!(meta.etag.unwrap().starts_with('"'));
        assert!(meta.last_modified.is_some());

        assert_eq!(&fs.get(url).await.unwrap()[..], b"id,value\n1,2\n");
        assert_eq!(&fs.get_range(url, 3, 5).await.unwrap()[..], b"value");

        fs.remove_file(url).await.unwrap();
        assert!(!fs.file_exists(url).await.unwrap());
        assert!(fs.get(url).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_should_ignore_option_query_when_addressing_object() {
        let fake = FakeS3::new();
        let fs = filesystem(&fake, credentials(&fake));
        fake.insert_object("s3://bucket/file.txt", Bytes::from_static(b"abc"));

        let body = fs
            .get("s3://bucket/file.txt?s3_region=us-east-1")
            .await
            .unwrap();
        assert_eq!(&body[..], b"abc");
    }

    #[tokio::test]
    async fn test_should_read_public_bucket_without_credentials() {
        let fake = FakeS3::new();
        fake.make_public("open-data");
        fake.insert_object("s3://open-data/table.parquet", Bytes::from_static(b"PAR1"));
        let fs = filesystem(&fake, Arc::new(StaticEnvironment::new()));

        let body = fs.get("s3://open-data/table.parquet").await.unwrap();
        assert_eq!(&body[..], b"PAR1");
        assert_eq!(fake.rejected(), 0);
    }

    #[tokio::test]
    async fn test_should_explain_missing_credentials_on_private_bucket() {
        let fake = FakeS3::new();
        fake.insert_object("s3://private/secret.csv", Bytes::from_static(b"x"));
        let fs = filesystem(&fake, Arc::new(StaticEnvironment::new()));

        let err = fs.get("s3://private/secret.csv").await.unwrap_err();
        match err {
            S3FsError::AuthFailure {
                status,
                code,
                hint,
                credentials_provided,
                ..
            } => {
                assert_eq!(status, 403);
                assert_eq!(code, "AccessDenied");
                assert!(!credentials_provided);
                assert!(hint.contains("No credentials are provided"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_should_reject_unknown_url_option() {
        let fake = FakeS3::new();
        let fs = filesystem(&fake, credentials(&fake));

        let err = fs.get("s3://bucket/file.txt?s3_colour=blue").await.unwrap_err();
        assert!(matches!(err, S3FsError::InvalidOption(_)));
    }
}
