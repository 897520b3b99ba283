//! Person Example - Properties, actions and reactions
//!
//! This example walks through the event system:
//! - A `Person` type with validated properties and a `birthday` action
//! - An explicit reaction that logs every change of `age`
//! - An implicit reaction that tracks whatever it reads
//! - A `Family` whose reaction follows `members*.age` as people come and go
//!
//! Run with: RUST_LOG=debug cargo run --example person

use spark_event::{
    Component, ComponentType, Error, PropSpec, Result, Value, iter, reset_runtime,
};
use tracing_subscriber::EnvFilter;

fn person_type() -> Result<ComponentType> {
    ComponentType::builder("Person")
        .property("first_name", PropSpec::string("john").settable())
        .property("last_name", PropSpec::string("doe").settable())
        .property(
            "age",
            PropSpec::int(0).settable().check(|v| match v.as_int() {
                Some(n) if n >= 0 => Ok(v.clone()),
                _ => Err(Error::validation("age", "must not be negative")),
            }),
        )
        .action("birthday", |this, _| {
            let age = this.get("age")?.as_int().unwrap_or(0);
            this.mutate("age", age + 1).map(drop)
        })
        .reaction("log_age", &["age"], |this, events| {
            for ev in events {
                println!(
                    "  {} age: {} -> {}",
                    this.get("first_name")?,
                    ev.old_value().cloned().unwrap_or_default(),
                    ev.new_value().cloned().unwrap_or_default()
                );
            }
            Ok(())
        })
        .build()
}

fn family_type() -> Result<ComponentType> {
    ComponentType::builder("Family")
        .property("members", PropSpec::list(vec![]).settable())
        .reaction("member_aged", &["members*.age"], |_, events| {
            let names: Vec<String> = events
                .iter()
                .map(|ev| ev.source().get("first_name").unwrap_or_default().to_string())
                .collect();
            println!("  family: {} had a birthday", names.join(", "));
            Ok(())
        })
        .build()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    reset_runtime();

    println!("=== spark-event Person Example ===\n");

    let person = person_type()?;
    let family = family_type()?;

    println!("Creating john (initial values are reported once):");
    let john = Component::new(&person, vec![("age", 41.into())])?;
    iter()?;

    println!("\nTwo birthdays, one iteration:");
    john.invoke("birthday", &[])?;
    john.invoke("birthday", &[])?;
    iter()?;

    println!("\nImplicit reaction on the full name:");
    john.implicit_reaction(|this| {
        println!(
            "  full name: {} {}",
            this.get("first_name")?,
            this.get("last_name")?
        );
        Ok(())
    })?;
    iter()?;
    john.invoke("set_last_name", &[Value::from("smith")])?;
    iter()?;

    println!("\nDirect mutation outside an action is refused:");
    match john.mutate("age", 3) {
        Err(err) => println!("  {err}"),
        Ok(_) => println!("  (unexpectedly allowed)"),
    }

    println!("\nA family following its members:");
    let jane = Component::new(&person, vec![("first_name", "jane".into())])?;
    let home = Component::new(&family, vec![("members", Value::List(vec![john.into()]).into())])?;
    iter()?;
    john.invoke("birthday", &[])?;
    jane.invoke("birthday", &[])?;
    iter()?;

    println!("\nJane joins:");
    home.invoke("set_members", &[Value::List(vec![john.into(), jane.into()])])?;
    iter()?;
    jane.invoke("birthday", &[])?;
    iter()?;

    println!("\nJohn leaves for good:");
    john.dispose();
    home.invoke("set_members", &[Value::List(vec![jane.into()])])?;
    iter()?;
    jane.invoke("birthday", &[])?;
    iter()?;

    println!("\n=== Example Complete ===");
    Ok(())
}
