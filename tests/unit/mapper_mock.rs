//! `mockall` earns its keep on the one plain synchronous trait seam in
//! the schema module: `ValueMapper`. It isn't `#[automock]`-attributed
//! in `src` (mapper authors are application code, not this crate), so
//! this hand-writes the mock with `mockall::mock!` against the trait
//! definition instead.

use std::sync::Arc;

use mockall::mock;
use mockall::predicate::eq;
use relorm::schema::descriptor::PropertyDescriptor;
use relorm::schema::ValueMapper;
use relorm::value::AppValue;

mock! {
    pub MapperMock {}

    impl ValueMapper for MapperMock {
        fn sql_type(&self) -> &'static str;
        fn to_driver(&self, app_value: AppValue) -> AppValue;
        fn from_driver(&self, driver_value: AppValue) -> AppValue;
    }
}

#[test]
fn map_from_driver_skips_the_mapper_on_null_and_calls_it_otherwise() {
    let mut mapper = MockMapperMock::new();
    mapper
        .expect_from_driver()
        .with(eq(AppValue::Int(42)))
        .times(1)
        .returning(|_| AppValue::Text("mapped".into()));

    let property = PropertyDescriptor::new("score", "score", "bigint").with_mapper(Arc::new(mapper));

    assert_eq!(property.map_from_driver(AppValue::Null), AppValue::Null);
    assert_eq!(
        property.map_from_driver(AppValue::Int(42)),
        AppValue::Text("mapped".into())
    );
}

#[test]
fn map_to_driver_skips_the_mapper_on_null_and_calls_it_otherwise() {
    let mut mapper = MockMapperMock::new();
    mapper
        .expect_to_driver()
        .with(eq(AppValue::Text("mapped".into())))
        .times(1)
        .returning(|_| AppValue::Int(42));

    let property = PropertyDescriptor::new("score", "score", "bigint").with_mapper(Arc::new(mapper));

    assert_eq!(property.map_to_driver(AppValue::Null), AppValue::Null);
    assert_eq!(
        property.map_to_driver(AppValue::Text("mapped".into())),
        AppValue::Int(42)
    );
}

#[test]
fn sql_type_passes_through_from_the_mapper() {
    let mut mapper = MockMapperMock::new();
    mapper.expect_sql_type().return_const("integer");
    let property = PropertyDescriptor::new("score", "score", "bigint").with_mapper(Arc::new(mapper));
    assert_eq!(property.value_mapper.as_ref().unwrap().sql_type(), "integer");
}
