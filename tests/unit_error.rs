use varve::error::{Error, ErrorCategory};
use varve::task::TaskId;

#[test]
fn categories_map_correctly() {
    let caller = Error::InvalidArgument("segments must be nonempty".to_string());
    assert_eq!(caller.category(), ErrorCategory::InvalidInput);

    let parse = Error::ParseInterval("2020-01-01".to_string());
    assert_eq!(parse.category(), ErrorCategory::InvalidInput);

    let validation = Error::SegmentsNotCovered {
        task_id: TaskId::from("index_wikipedia"),
        segments: vec!["wikipedia_2020-01-01T00:00:00Z_2020-02-01T00:00:00Z_v1".to_string()],
    };
    assert_eq!(validation.category(), ErrorCategory::Validation);

    let mixed = Error::MixedPartitionSet {
        segments: vec!["a".to_string(), "b".to_string()],
    };
    assert_eq!(mixed.category(), ErrorCategory::Validation);

    let io = Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk gone"));
    assert_eq!(io.category(), ErrorCategory::Infrastructure);
}

#[test]
fn validation_messages_name_offenders() {
    let err = Error::SegmentsNotCovered {
        task_id: TaskId::from("index_wikipedia"),
        segments: vec![
            "wikipedia_2020-01-01T00:00:00Z_2020-02-01T00:00:00Z_v1".to_string(),
            "wikipedia_2020-02-01T00:00:00Z_2020-03-01T00:00:00Z_v1".to_string(),
        ],
    };
    let message = err.to_string();
    assert!(message.contains("index_wikipedia"));
    assert!(message.contains("wikipedia_2020-01-01T00:00:00Z_2020-02-01T00:00:00Z_v1"));
    assert!(message.contains("wikipedia_2020-02-01T00:00:00Z_2020-03-01T00:00:00Z_v1"));

    let err = Error::MixedPartitionSet {
        segments: vec!["seg_a".to_string(), "seg_b".to_string()],
    };
    let message = err.to_string();
    assert!(message.contains("seg_a"));
    assert!(message.contains("seg_b"));
}
