use std::sync::Arc;

use orbeon_forms::{
    tags, BoxError, CompileOptions, DecodeError, Decoder, DecoderRegistry, FormError, RawValue,
    Runner, Schema, Value,
};
use time::macros::{date, format_description};
use time::{Date, Duration};

const DEFINITION: &str = include_str!("data/controls_definition.xml");
const INSTANCE: &str = include_str!("data/controls_instance.xml");

const RUNNER_IMAGE: &str =
    "/fr/service/persistence/crud/orbeon/runner/data/24/43dbaabe1e3aa8862fd4de321b619709d62cc097.bin";
const BUILDER_IMAGE: &str =
    "/fr/service/persistence/crud/orbeon/builder/data/33/a8523db8eba50aac53dfe15ece2758e6475cfc21.bin";

struct StringDecoder {
    suffix: &'static str,
}

impl Decoder for StringDecoder {
    fn decode(&self, raw: RawValue<'_>) -> Result<Value, BoxError> {
        Ok(raw
            .text()
            .map_or(Value::Null, |text| format!("{text} {}", self.suffix).into()))
    }
}

/// Parses the date and shifts it ten days ahead.
struct ShiftedDateDecoder;

impl Decoder for ShiftedDateDecoder {
    fn decode(&self, raw: RawValue<'_>) -> Result<Value, BoxError> {
        let Some(text) = raw.text() else {
            return Ok(Value::Null);
        };
        let date = Date::parse(text.trim(), format_description!("[year]-[month]-[day]"))?;
        Ok(Value::Date(date + Duration::days(10)))
    }
}

/// Decorates the reference of any attachment-like value with a marker.
struct DecoratedUri {
    marker: &'static str,
}

impl Decoder for DecoratedUri {
    fn decode(&self, raw: RawValue<'_>) -> Result<Value, BoxError> {
        let uri: Value = raw
            .text()
            .map_or(Value::Null, |text| format!("{text} {}", self.marker).into());
        Ok(Value::map([("uri", uri.clone()), ("value", uri)]))
    }
}

struct AnnotationParts;

impl Decoder for AnnotationParts {
    fn decode(&self, raw: RawValue<'_>) -> Result<Value, BoxError> {
        let Some(node) = raw.node() else {
            return Ok(Value::map(Vec::<(String, Value)>::new()));
        };
        Ok(Value::map(node.children().map(|child| {
            let name = child.local_name().to_string();
            let text = format!("{name} FROM ImageAnnotationDecoder");
            (name, Value::from(text))
        })))
    }
}

fn bind_with(decoders: DecoderRegistry) -> Result<orbeon_forms::BoundForm, FormError> {
    Runner::from_definition(DEFINITION, &CompileOptions::new("en"), decoders)
        .expect("compile")
        .bind_str(INSTANCE)
}

fn single(form: &orbeon_forms::BoundForm, name: &str) -> Value {
    form.value(name)
        .expect("known control")
        .cloned()
        .expect("single value")
}

#[test]
fn simple_input_decoder() {
    let decoders = DecoderRegistry::new().with(
        tags::STRING,
        StringDecoder {
            suffix: "FROM StringDecoder",
        },
    );
    let form = bind_with(decoders).expect("bind");
    assert_eq!(single(&form, "input"), Value::from("John FROM StringDecoder"));
    assert_eq!(
        single(&form, "inputcounter"),
        Value::from("Don't even try to make it too long! FROM StringDecoder")
    );
}

#[test]
fn multiple_decoders() {
    let decoders = DecoderRegistry::new()
        .with(
            tags::STRING,
            StringDecoder {
                suffix: "FROM StringDecoder",
            },
        )
        .with(tags::DATE, ShiftedDateDecoder);
    let form = bind_with(decoders).expect("bind");
    assert_eq!(single(&form, "input"), Value::from("John FROM StringDecoder"));
    assert_eq!(single(&form, "date"), Value::Date(date!(2017 - 07 - 11)));
}

#[test]
fn image_attachment_decoder() {
    let decoders = DecoderRegistry::new().with(
        tags::ANY_URI,
        DecoratedUri {
            marker: "FROM AnyUriDecoderImageAttachment",
        },
    );
    let form = bind_with(decoders).expect("bind");
    let expected = Value::from(format!("{RUNNER_IMAGE} FROM AnyUriDecoderImageAttachment"));
    let image = single(&form, "imageattachment");
    assert_eq!(image.get("uri"), Some(&expected));
    assert_eq!(image.get("value"), Some(&expected));
}

#[test]
fn static_image_decoder() {
    let decoders = DecoderRegistry::new().with(
        tags::ANY_URI,
        DecoratedUri {
            marker: "BY THE AnyUriDecoderStaticImage",
        },
    );
    let form = bind_with(decoders).expect("bind");
    let expected = Value::from(format!("{BUILDER_IMAGE} BY THE AnyUriDecoderStaticImage"));
    let image = single(&form, "staticimage");
    assert_eq!(image.get("uri"), Some(&expected));
    assert_eq!(image.get("value"), Some(&expected));
}

#[test]
fn image_annotation_decoder() {
    let decoders = DecoderRegistry::new().with(tags::IMAGE_ANNOTATION, AnnotationParts);
    let form = bind_with(decoders).expect("bind");
    let annotation = single(&form, "imageannotation");
    assert_eq!(
        annotation.get("image"),
        Some(&Value::from("image FROM ImageAnnotationDecoder"))
    );
    assert_eq!(
        annotation.get("annotation"),
        Some(&Value::from("annotation FROM ImageAnnotationDecoder"))
    );
}

#[test]
fn decoders_only_touch_their_tag() {
    let decoders = DecoderRegistry::new().with(tags::DATE, ShiftedDateDecoder);
    let form = bind_with(decoders).expect("bind");
    assert_eq!(single(&form, "input"), Value::from("John"));
    assert_eq!(single(&form, "number"), Value::Decimal(1234.5));
    assert_eq!(single(&form, "date"), Value::Date(date!(2017 - 07 - 11)));
}

#[test]
fn unregistered_tags_pass_text_through() {
    let form = bind_with(DecoderRegistry::empty()).expect("bind");
    assert_eq!(single(&form, "date"), Value::from("2017-07-01"));
    assert_eq!(single(&form, "yesno"), Value::from("true"));
    assert_eq!(single(&form, "checkboxes"), Value::from("option-1 option-3"));
    assert_eq!(single(&form, "imageattachment"), Value::from(RUNNER_IMAGE));

    let mut decoders = DecoderRegistry::new();
    assert!(decoders.unregister(tags::DATE).is_some());
    let form = bind_with(decoders).expect("bind");
    assert_eq!(single(&form, "date"), Value::from("2017-07-01"));
}

#[test]
fn custom_tags_can_be_registered() {
    let email = |raw: RawValue<'_>| -> Result<Value, BoxError> {
        let Some(text) = raw.text() else {
            return Ok(Value::Null);
        };
        let (user, domain) = text.trim().split_once('@').ok_or("not an email address")?;
        Ok(Value::map([("user", Value::from(user)), ("domain", Value::from(domain))]))
    };
    let form = bind_with(DecoderRegistry::new().with("email", email)).expect("bind");
    let address = single(&form, "email");
    assert_eq!(address.get("domain"), Some(&Value::from("example.org")));

    let contacts = form.get("contact-email").expect("contact emails");
    let second = contacts.at(1).and_then(|bound| bound.value());
    assert_eq!(second, Some(&Value::Null));
}

#[test]
fn failing_decoder_reports_control_and_tag() {
    let strict = |raw: RawValue<'_>| -> Result<Value, BoxError> {
        let text = raw.text().ok_or("missing value")?;
        Ok(Value::Decimal(text.trim().parse::<f64>()?))
    };
    let instance = INSTANCE.replace("<number>1234.5</number>", "<number>lots</number>");
    let runner = Runner::from_definition(
        DEFINITION,
        &CompileOptions::new("en"),
        DecoderRegistry::new().with(tags::DECIMAL, strict),
    )
    .expect("compile");
    let DecodeError {
        control_id,
        type_tag,
        cause,
    } = match runner.bind_str(&instance) {
        Err(FormError::Decode(err)) => err,
        other => panic!("expected a decode error, got {other:?}"),
    };
    assert_eq!(control_id, "number");
    assert_eq!(type_tag, tags::DECIMAL);
    assert!(cause.to_string().contains("invalid float"), "{cause}");
}

#[test]
fn registries_are_independent_per_runner() {
    let definition = orbeon_forms::parse(DEFINITION).expect("parse");
    let schema = Arc::new(Schema::compile(&definition, &CompileOptions::new("en")).expect("compile"));
    let plain = Runner::new(Arc::clone(&schema), DecoderRegistry::new());
    let loud = Runner::new(
        Arc::clone(&schema),
        DecoderRegistry::new().with(
            tags::STRING,
            StringDecoder {
                suffix: "FROM StringDecoder",
            },
        ),
    );
    let instance = orbeon_forms::parse(INSTANCE).expect("parse");
    let a = plain.bind(&instance).expect("plain");
    let b = loud.bind(&instance).expect("loud");
    assert_eq!(single(&a, "input"), Value::from("John"));
    assert_eq!(single(&b, "input"), Value::from("John FROM StringDecoder"));
    assert!(Arc::ptr_eq(plain.schema(), loud.schema()));
}

#[test]
fn replacing_a_decoder_returns_the_previous_one() {
    let mut decoders = DecoderRegistry::new();
    let previous = decoders.register(tags::STRING, StringDecoder { suffix: "!" });
    assert!(previous.is_some());
    let first = decoders.register(tags::STRING, StringDecoder { suffix: "?" });
    let replaced = first.expect("replaced");
    assert_eq!(
        replaced.decode(RawValue::Text("hi")).expect("decode"),
        Value::from("hi !")
    );
    assert_eq!(
        decoders.decode(tags::STRING, RawValue::Text("hi")).expect("decode"),
        Value::from("hi ?")
    );
}
