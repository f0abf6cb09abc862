//! Photo change detection between two snapshots.

use bytes::Bytes;

use crate::record::RecordId;
use crate::tree::TreeSnapshot;

/// A change to a record's photo between two generations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub record_id: RecordId,
    pub attribute: String,
    pub previously_present: bool,
    /// New photo bytes, `None` when the photo went away.
    pub new_value: Option<Bytes>,
    /// Path of the photo file inside the tree, when present.
    pub photo_path: Option<String>,
    pub uid: Option<u32>,
}

impl ChangeEvent {
    pub fn is_removal(&self) -> bool {
        self.new_value.is_none()
    }
}

/// Compare the decoded photo of every record in `previous` and `next`.
///
/// Records are reported in `next` order, followed by records that vanished
/// while still holding a photo.
pub fn diff_photos(previous: &TreeSnapshot, next: &TreeSnapshot, attribute: &str) -> Vec<ChangeEvent> {
    let mut events = Vec::new();

    for entry in next.records() {
        let old = previous
            .record(&entry.id)
            .and_then(|old| old.photo.as_ref())
            .map(|photo| &photo.content);
        let new = entry.photo.as_ref();

        if old == new.map(|photo| &photo.content) {
            continue;
        }

        events.push(ChangeEvent {
            record_id: entry.id.clone(),
            attribute: attribute.to_string(),
            previously_present: old.is_some(),
            new_value: new.map(|photo| photo.content.clone()),
            photo_path: new.map(|photo| photo.path.clone()),
            uid: entry.uid,
        });
    }

    for entry in previous.records() {
        if entry.photo.is_none() || next.record(&entry.id).is_some() {
            continue;
        }
        events.push(ChangeEvent {
            record_id: entry.id.clone(),
            attribute: attribute.to_string(),
            previously_present: true,
            new_value: None,
            photo_path: None,
            uid: entry.uid,
        });
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use crate::tree::{BuildOptions, SnapshotBuilder};

    const PHOTO_A: &[u8] = &[0xff, 0xd8, 0xff, 0xe0, b'a'];
    const PHOTO_B: &[u8] = &[0xff, 0xd8, 0xff, 0xe0, b'b'];

    fn user(name: &str, photo: Option<&'static [u8]>) -> Record {
        let record = Record::new(format!("cn={},dc=example", name).as_str())
            .with_value("uidNumber", "1000");
        match photo {
            Some(photo) => record.with_value("jpegPhoto", photo),
            None => record,
        }
    }

    fn build(previous: &TreeSnapshot, records: Vec<Record>) -> TreeSnapshot {
        SnapshotBuilder::new(BuildOptions::default()).build(previous, records)
    }

    #[test]
    fn test_absent_to_present() {
        let first = build(&TreeSnapshot::empty(), vec![user("alice", None)]);
        let second = build(&first, vec![user("alice", Some(PHOTO_A))]);

        let events = diff_photos(&first, &second, "jpegPhoto");
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert!(!event.previously_present);
        assert_eq!(event.new_value.as_deref(), Some(PHOTO_A));
        assert_eq!(
            event.photo_path.as_deref(),
            Some("/example/alice/jpegPhoto.jpg")
        );
        assert_eq!(event.uid, Some(1000));
    }

    #[test]
    fn test_unchanged_photo_yields_nothing() {
        let first = build(&TreeSnapshot::empty(), vec![user("alice", Some(PHOTO_A))]);
        let second = build(&first, vec![user("alice", Some(PHOTO_A))]);
        assert!(diff_photos(&first, &second, "jpegPhoto").is_empty());
    }

    #[test]
    fn test_attribute_named_like_photo_file_is_not_a_change() {
        let first = build(&TreeSnapshot::empty(), vec![user("alice", Some(PHOTO_A))]);
        let second = build(
            &first,
            vec![user("alice", Some(PHOTO_A)).with_value("jpegPhoto.jpg", "not a photo")],
        );
        assert!(diff_photos(&first, &second, "jpegPhoto").is_empty());
    }

    #[test]
    fn test_changed_and_removed() {
        let first = build(
            &TreeSnapshot::empty(),
            vec![user("alice", Some(PHOTO_A)), user("bob", Some(PHOTO_A))],
        );
        let second = build(&first, vec![user("alice", Some(PHOTO_B)), user("bob", None)]);

        let events = diff_photos(&first, &second, "jpegPhoto");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].new_value.as_deref(), Some(PHOTO_B));
        assert!(events[0].previously_present);
        assert!(events[1].is_removal());
        assert_eq!(events[1].record_id, RecordId::from("cn=bob,dc=example"));
    }

    #[test]
    fn test_deleted_record_with_photo() {
        let first = build(&TreeSnapshot::empty(), vec![user("alice", Some(PHOTO_A))]);
        let second = build(&first, vec![]);

        let events = diff_photos(&first, &second, "jpegPhoto");
        assert_eq!(events.len(), 1);
        assert!(events[0].is_removal());
        assert!(events[0].previously_present);
    }

    #[test]
    fn test_other_attributes_are_ignored() {
        let first = build(
            &TreeSnapshot::empty(),
            vec![user("alice", Some(PHOTO_A)).with_value("mail", "a@example.com")],
        );
        let second = build(
            &first,
            vec![user("alice", Some(PHOTO_A)).with_value("mail", "b@example.com")],
        );
        assert!(diff_photos(&first, &second, "jpegPhoto").is_empty());
    }
}
