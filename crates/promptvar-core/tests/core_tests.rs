use promptvar_core::{
    CacheConfig, FsError, GlobalVariable, HandleEntry, HandleKind, HandleRef, ListOptions,
    ReadOptions, ResolverConfig, TemplateRecord, TextEncoding, VariableEntry, VariableValue,
};

#[test]
fn test_variable_entry_kinds() {
    let text = VariableEntry::text("hello");
    assert_eq!(text.handle_kind(), None);
    assert!(text.handle_entry().is_none());
    assert_eq!(text.materialized(), Some("hello"));

    let file = VariableEntry::File(HandleEntry::new("a.md", HandleRef::registered("file-a")));
    assert_eq!(file.handle_kind(), Some(HandleKind::File));
    assert_eq!(file.materialized(), None);

    let dir = VariableEntry::Directory(HandleEntry::new("src", HandleRef::default()));
    assert_eq!(dir.handle_kind(), Some(HandleKind::Directory));
}

#[test]
fn test_global_variable_round_trip_keeps_bookkeeping_only() {
    let mut entry = HandleEntry::new("notes.md", HandleRef::registered("file-notes-1"));
    entry.content = Some("cached content".to_string());
    let global = GlobalVariable::new(
        "doc",
        VariableValue::new(vec![VariableEntry::text("intro"), VariableEntry::File(entry)]),
    );

    let json = serde_json::to_string(&global).unwrap();
    assert!(!json.contains("cached content"));

    let restored: GlobalVariable = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.name, "doc");
    let restored_entry = restored.value.entries()[1].handle_entry().unwrap();
    assert_eq!(restored_entry.value.id.as_deref(), Some("file-notes-1"));
    assert!(restored_entry.value.handle.is_none());
    assert!(restored_entry.content.is_none());
}

#[test]
fn test_template_record_serde_defaults() {
    let record: TemplateRecord =
        serde_json::from_str(r#"{"id":"t1","name":"Greeting","content":"Hi {{name}}"}"#).unwrap();
    assert_eq!(record.content, "Hi {{name}}");
    assert!(record.category.is_none());
    assert!(record.variables.is_none());

    let fresh = TemplateRecord::new("t1", "Greeting", "Hi {{name}}");
    assert_eq!(record, fresh);
}

#[test]
fn test_config_from_json_uses_defaults() {
    let cache: CacheConfig = serde_json::from_str(r#"{"max_size": 5}"#).unwrap();
    assert!(cache.enabled);
    assert_eq!(cache.max_size, 5);
    assert_eq!(cache.default_ttl_secs, 300);

    let resolver: ResolverConfig =
        serde_json::from_str(r#"{"read": {"encoding": "utf8-lossy"}}"#).unwrap();
    assert_eq!(resolver.read.encoding, TextEncoding::Utf8Lossy);
    assert_eq!(resolver.max_concurrent_reads, 4);
    assert_eq!(resolver.list, ListOptions::default());
}

#[test]
fn test_read_options_decode_limits() {
    let options = ReadOptions {
        encoding: TextEncoding::Utf8,
        max_bytes: Some(3),
    };
    assert_eq!(options.decode("a.txt", b"abcdef".to_vec()).unwrap(), "abc");
    assert_eq!(options.decode("a.txt", b"ab".to_vec()).unwrap(), "ab");
}

#[test]
fn test_write_error_classification() {
    let err = FsError::write(
        "out.txt",
        std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
    );
    assert!(err.is_permission_denied());
    assert!(err.to_string().contains("readwrite"));
}
