//! Multipart upload integration tests.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use s3vfs_core::ObjectFileSystem;
    use s3vfs_core::multipart::UploadState;

    use crate::{FakeS3, MIB, credentials, filesystem_with_settings, patterned, small_part_settings};

    #[tokio::test]
    async fn test_should_upload_large_file_in_parts() {
        let fake = FakeS3::new();
        let fs = filesystem_with_settings(&fake, credentials(&fake), small_part_settings());
        let data = patterned(25 * MIB);

        let mut handle = fs.open_write("s3://bucket/big.bin").await.unwrap();
        assert_eq!(handle.part_size(), 5 * MIB);
        let mut offset = 0;
        for chunk in data.chunks(usize::try_from(MIB).unwrap()) {
            handle.write(chunk, offset).await.unwrap();
            offset += chunk.len() as u64;
        }
        handle.finalize().await.unwrap();
        handle.close().await.unwrap();

        assert_eq!(handle.state(), UploadState::Completed);
        assert_eq!(fake.completions(), vec![vec![1, 2, 3, 4, 5]]);
        assert_eq!(fake.object("s3://bucket/big.bin").unwrap(), Bytes::from(data));
        assert_eq!(fake.open_uploads(), 0);
        assert_eq!(fake.aborted(), 0);
    }

    #[tokio::test]
    async fn test_should_complete_parts_in_order_when_uploads_finish_out_of_order() {
        let fake = FakeS3::new();
        fake.delay_part(1, Duration::from_millis(50));
        let fs = filesystem_with_settings(&fake, credentials(&fake), small_part_settings());
        let data = patterned(12 * MIB);

        let mut handle = fs.open_write("s3://bucket/slow.bin").await.unwrap();
        handle.write(&data, 0).await.unwrap();
        handle.finalize().await.unwrap();

        assert_eq!(fake.part_arrivals().last(), Some(&1));
        assert_eq!(fake.completions(), vec![vec![1, 2, 3]]);
        assert_eq!(fake.object("s3://bucket/slow.bin").unwrap(), Bytes::from(data));
    }

    #[tokio::test]
    async fn test_should_write_small_file_as_single_part() {
        let fake = FakeS3::new();
        let fs = filesystem_with_settings(&fake, credentials(&fake), small_part_settings());

        fs.write_all("s3://bucket/small.txt", Bytes::from_static(b"hello"))
            .await
            .unwrap();

        assert_eq!(fake.completions(), vec![vec![1]]);
        assert_eq!(&fake.object("s3://bucket/small.txt").unwrap()[..], b"hello");
    }

    #[tokio::test]
    async fn test_should_create_empty_object_from_empty_upload() {
        let fake = FakeS3::new();
        let fs = filesystem_with_settings(&fake, credentials(&fake), small_part_settings());

        let mut handle = fs.open_write("s3://bucket/empty").await.unwrap();
        handle.finalize().await.unwrap();

        assert_eq!(fake.completions(), vec![vec![1]]);
        assert!(fake.object("s3://bucket/empty").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_should_abort_upload_closed_without_finalize() {
        let fake = FakeS3::new();
        let fs = filesystem_with_settings(&fake, credentials(&fake), small_part_settings());

        let mut handle = fs.open_write("s3://bucket/partial.bin").await.unwrap();
        handle.write(&patterned(3 * MIB), 0).await.unwrap();
        handle.close().await.unwrap();

        assert_eq!(handle.state(), UploadState::Aborted);
        assert_eq!(fake.aborted(), 1);
        assert_eq!(fake.open_uploads(), 0);
        assert!(fake.object("s3://bucket/partial.bin").is_none());
        assert!(fake.completions().is_empty());
    }

    #[tokio::test]
    async fn test_should_fail_upload_without_valid_credentials() {
        let fake = FakeS3::new();
        let fs = filesystem_with_settings(&fake, credentials(&fake), small_part_settings());
        let anonymous = crate::filesystem(&fake, std::sync::Arc::default());

        let err = anonymous.open_write("s3://bucket/denied.bin").await.unwrap_err();
        assert!(err.is_auth_failure());
        assert_eq!(fake.open_uploads(), 0);
        assert!(!fs.file_exists("s3://bucket/denied.bin").await.unwrap());
    }
}
