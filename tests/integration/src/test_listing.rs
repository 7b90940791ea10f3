//! Listing, glob and directory integration tests.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use s3vfs_core::{ListEntry, S3FileSystem};

    use crate::{FakeS3, credentials, filesystem};

    const OBJECTS: [&str; 6] = [
        "s3://bucket/data/a.csv",
        "s3://bucket/data/b.csv",
        "s3://bucket/data/notes.txt",
        "s3://bucket/data/sub/c.csv",
        "s3://bucket/data/sub/deep/d.csv",
        "s3://bucket/other/e.csv",
    ];

    fn seeded(page_size: usize) -> (Arc<FakeS3>, S3FileSystem) {
        let fake = FakeS3::new();
        fake.set_page_size(page_size);
        for url in OBJECTS {
            fake.insert_object(url, Bytes::from_static(b"1,2"));
        }
        let fs = filesystem(&fake, credentials(&fake));
        (fake, fs)
    }

    #[tokio::test]
    async fn test_should_glob_single_level_across_pages() {
        let (_fake, fs) = seeded(2);

        let matches = fs.glob("s3://bucket/data/*.csv").await.unwrap();
        assert_eq!(
            matches,
            vec!["s3://bucket/data/a.csv", "s3://bucket/data/b.csv"]
        );
    }

    #[tokio::test]
    async fn test_should_glob_recursively() {
        let (_fake, fs) = seeded(1000);

        let matches = fs.glob("s3://bucket/data/**/*.csv").await.unwrap();
        assert_eq!(
            matches,
            vec![
                "s3://bucket/data/a.csv",
                "s3://bucket/data/b.csv",
                "s3://bucket/data/sub/c.csv",
                "s3://bucket/data/sub/deep/d.csv",
            ]
        );
    }

    #[tokio::test]
    async fn test_should_keep_options_on_glob_results() {
        let (_fake, fs) = seeded(1000);

        let matches = fs
            .glob("s3://bucket/data/sub/*.csv?s3_region=us-east-1")
            .await
            .unwrap();
        assert_eq!(matches, vec!["s3://bucket/data/sub/c.csv?s3_region=us-east-1"]);
    }

    #[tokio::test]
    async fn test_should_list_directory_with_prefixes() {
        let (_fake, fs) = seeded(2);

        let mut entries = fs.list_files("s3://bucket/data/").await.unwrap();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(
            entries,
            vec![
                ListEntry {
                    path: "s3://bucket/data/a.csv".to_owned(),
                    is_dir: false,
                    size: 3,
                },
                ListEntry {
                    path: "s3://bucket/data/b.csv".to_owned(),
                    is_dir: false,
                    size: 3,
                },
                ListEntry {
                    path: "s3://bucket/data/notes.txt".to_owned(),
                    is_dir: false,
                    size: 3,
                },
                ListEntry {
                    path: "s3://bucket/data/sub".to_owned(),
                    is_dir: true,
                    size: 0,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_should_decode_listed_keys() {
        let fake = FakeS3::new();
        let fs = filesystem(&fake, credentials(&fake));
        fake.insert_object("s3://bucket/dir/with space&amp.csv", Bytes::from_static(b"x"));

        let matches = fs.glob("s3://bucket/dir/*.csv").await.unwrap();
        assert_eq!(matches, vec!["s3://bucket/dir/with space&amp.csv"]);
        assert_eq!(&fs.get(&matches[0]).await.unwrap()[..], b"x");
    }

    #[tokio::test]
    async fn test_should_remove_directory_recursively() {
        let (fake, fs) = seeded(2);

        fs.remove_directory("s3://bucket/data").await.unwrap();

        for url in &OBJECTS[..5] {
            assert!(fake.object(url).is_none(), "{url} should be removed");
        }
        assert!(fake.object("s3://bucket/other/e.csv").is_some());
        assert!(fs.glob("s3://bucket/data/**").await.unwrap().is_empty());
    }
}
