//! Installer contract.
//!
//! An installer configures a freshly constructed, not-yet-initialized entity:
//! it may add tags, values, and behaviours any number of times before the
//! host calls [`Entity::init`] (or [`Entity::spawn`]). The runtime places no
//! constraints on installers beyond the ordinary tag/value/behaviour
//! contracts.

use crate::entity::Entity;

/// Configures a fresh entity before initialization.
pub trait Installer {
    fn install(&self, entity: &Entity);
}

/// Any `Fn(&Entity)` closure is an installer.
impl<F: Fn(&Entity)> Installer for F {
    fn install(&self, entity: &Entity) {
        self(entity)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::Tag;
    use crate::value::ValueKey;

    const COIN: Tag = Tag(1);
    const MONEY: ValueKey = ValueKey(1);

    fn coin_installer(entity: &Entity) {
        entity.add_tag(COIN).unwrap();
        entity.add_value(MONEY, 10i64).unwrap();
    }

    #[test]
    fn closure_installers_configure_entities() {
        let entity = Entity::named("coin");
        coin_installer.install(&entity);
        entity.init().unwrap();

        assert!(entity.has_tag(COIN));
        assert_eq!(entity.value::<i64>(MONEY).unwrap(), 10);
    }

    #[test]
    fn installers_run_as_trait_objects() {
        let installers: Vec<Box<dyn Installer>> = vec![
            Box::new(|e: &Entity| {
                e.add_tag(COIN).unwrap();
            }),
            Box::new(|e: &Entity| {
                e.add_value(MONEY, 5i64).unwrap();
            }),
        ];

        let entity = Entity::new();
        for installer in &installers {
            installer.install(&entity);
        }
        assert!(entity.has_tag(COIN));
        assert!(entity.has_value(MONEY));
    }
}
