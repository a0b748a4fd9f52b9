use super::*;

#[test]
fn schema_layout() {
    let schema = create_schema(768);

    let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
    assert_eq!(names.first(), Some(&"id"));
    assert!(names.contains(&"notebook_id"));
    assert!(names.contains(&"embedding_model"));
    assert!(names.contains(&"truncated"));

    let upload_status = schema
        .field_with_name("upload_status")
        .expect("upload_status column exists");
    assert!(upload_status.is_nullable());

    let notebook = schema
        .field_with_name("notebook_id")
        .expect("notebook_id column exists");
    assert!(!notebook.is_nullable());
}

#[test]
fn schema_dimension_detection() {
    assert_eq!(schema_vector_dimension(&create_schema(5)), Some(5));
    assert_eq!(schema_vector_dimension(&create_schema(768)), Some(768));

    let without_vector = Schema::new(vec![Field::new("id", DataType::Utf8, false)]);
    assert_eq!(schema_vector_dimension(&without_vector), None);
}
