use super::*;
use crate::common::Error;
use crate::types::field::Field;

#[test]
pub fn test_comparison() {
    let mut fields = vec![
        Field::from(1),
        Field::from(2),
        Field::from(3),
        Field::from(4),
        Field::from(5),
    ];

    // Tuples with identical fields should be equal.
    let row = Row::from(fields.clone());
    let row_eq = Row::from(fields.clone());
    assert_eq!(row, row_eq);

    // Tuples with some differing fields should not be equal.
    fields[2] = Field::from(30);
    let row_ne = Row::from(fields);
    assert_ne!(row, row_ne);
}

#[test]
pub fn test_mixed_types() {
    let fields = vec![
        Field::from(1),
        Field::from("hello"),
        Field::from(3.14),
        Field::from(true),
        Field::Null,
    ];

    let row = Row::from(fields.clone());
    assert_eq!(row.size(), fields.len());
    fields
        .iter()
        .enumerate()
        .for_each(|(i, field)| assert_eq!(row.get_field(i).unwrap(), field));
    assert_eq!(row.get_field(5), Err(Error::OutOfBounds));
}

#[test]
pub fn test_join() {
    let left = Row::from(vec![Field::from(1), Field::from("a")]);
    let right = Row::from(vec![Field::from(2)]);

    let joined = left.join(&right);
    assert_eq!(joined.size(), 3);
    assert_eq!(
        joined,
        Row::from(vec![Field::from(1), Field::from("a"), Field::from(2)])
    );
    // the inputs are untouched
    assert_eq!(left.size(), 2);
    assert_eq!(joined.to_string(), "1, 'a', 2");
}
