/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

mod bind;
mod criteria;
mod error;
mod features;
mod ping;
mod provider;
mod sasl;
mod session;
mod stream_error;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;

use tracing::debug;
use tracing::error;
use tracing::trace;

pub use bind::BIND;
pub use bind::BindModule;
pub use criteria::Criteria;
pub use error::ModuleError;
pub use features::STREAM_FEATURES;
pub use features::StreamFeaturesModule;
pub use ping::PING;
pub use ping::PingModule;
pub use provider::ModuleProvider;
pub use provider::extend_for_dependencies;
pub use sasl::SASL;
pub use sasl::SaslModule;
pub use session::SESSION_CONTROLLER;
pub use session::SessionController;
pub use stream_error::STREAM_ERROR;
pub use stream_error::StreamErrorModule;

use crate::Context;
use crate::Element;
use crate::ErrorCondition;
use crate::Event;
use crate::XmppError;

/// Gives typed access to a module behind a trait object.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Hooks into the inbound and outbound element flow.
pub trait StanzaInterceptor {
    /// Returning `None` drops the element.
    fn after_receive(&mut self, _ctx: &mut Context, element: Element) -> Option<Element> {
        Some(element)
    }

    fn before_send(&mut self, _ctx: &mut Context, element: Element) -> Element {
        element
    }
}

/// A protocol handler plugged into the client.
pub trait XmppModule: AsAny + Send {
    /// Unique key of the module.
    fn module_type(&self) -> &'static str;

    /// Elements matching this are passed to `process`. Modules without
    /// criteria only see events.
    fn criteria(&self) -> Option<Criteria> {
        None
    }

    /// Advertised protocol features.
    fn features(&self) -> &'static [&'static str] {
        &[]
    }

    /// Called once after registration. Modules registered earlier are
    /// visible through `modules`.
    fn initialize(
        &mut self,
        _ctx: &mut Context,
        _modules: &ModuleLookup<'_>,
    ) -> Result<(), ModuleError> {
        Ok(())
    }

    /// An error is sent back to the peer as an error stanza.
    fn process(&mut self, _ctx: &mut Context, _element: &Element) -> Result<(), XmppError> {
        Err(XmppError::new(ErrorCondition::FeatureNotImplemented))
    }

    fn on_event(&mut self, _ctx: &mut Context, _event: &Event) {}

    fn interceptor(&mut self) -> Option<&mut dyn StanzaInterceptor> {
        None
    }
}

struct ModuleSlot {
    module: Box<dyn XmppModule>,
    criteria: Option<Criteria>,
    initialized: bool,
}

fn downcast<M: XmppModule + 'static>(slot: &ModuleSlot) -> Option<&M> {
    let module: &dyn XmppModule = slot.module.as_ref();
    module.as_any().downcast_ref::<M>()
}

/// Read only view of the other modules during initialization.
pub struct ModuleLookup<'a> {
    before: &'a [ModuleSlot],
    after: &'a [ModuleSlot],
}

impl ModuleLookup<'_> {
    fn slots(&self) -> impl Iterator<Item = &ModuleSlot> {
        self.before.iter().chain(self.after.iter())
    }

    pub fn contains(&self, module_type: &str) -> bool {
        self.slots()
            .any(|slot| slot.module.module_type() == module_type)
    }

    pub fn get<M: XmppModule + 'static>(&self) -> Option<&M> {
        self.slots().find_map(downcast::<M>)
    }

    /// Fails with `NotRegistered` if the module is missing.
    pub fn require(&self, module_type: &str) -> Result<(), ModuleError> {
        if self.contains(module_type) {
            Ok(())
        } else {
            Err(ModuleError::NotRegistered(module_type.to_string()))
        }
    }
}

/// Result of passing an element to the matching modules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// No module criteria matched.
    Unhandled,
    Handled,
    /// First failure reported by a matching module.
    Failed(XmppError),
}

/// Ordered registry of modules.
///
/// Registration order is the order of interceptors and of processing.
#[derive(Default)]
pub struct ModulesManager {
    slots: Vec<ModuleSlot>,
}

impl ModulesManager {
    pub fn new() -> Self {
        ModulesManager { slots: Vec::new() }
    }

    pub fn register(&mut self, module: Box<dyn XmppModule>) -> Result<(), ModuleError> {
        let module_type = module.module_type();
        if self.is_registered(module_type) {
            return Err(ModuleError::Duplicate(module_type.to_string()));
        }
        debug!(module = module_type, "registering module");
        let criteria = module.criteria();
        self.slots.push(ModuleSlot {
            module,
            criteria,
            initialized: false,
        });
        Ok(())
    }

    /// Registers the providers and everything they require.
    ///
    /// Dependencies which are already registered are skipped.
    pub fn register_providers(
        &mut self,
        providers: &[&'static ModuleProvider],
    ) -> Result<(), ModuleError> {
        for provider in extend_for_dependencies(providers)? {
            if !self.is_registered(provider.module_type) {
                self.register(provider.instantiate())?;
            }
        }
        Ok(())
    }

    /// Initializes the modules registered since the last call.
    pub fn init_modules(&mut self, ctx: &mut Context) -> Result<(), ModuleError> {
        for index in 0..self.slots.len() {
            if self.slots[index].initialized {
                continue;
            }
            let (before, rest) = self.slots.split_at_mut(index);
            let Some((slot, after)) = rest.split_first_mut() else {
                break;
            };
            let lookup = ModuleLookup { before, after };
            slot.module.initialize(ctx, &lookup)?;
            slot.initialized = true;
            trace!(module = slot.module.module_type(), "module initialized");
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_registered(&self, module_type: &str) -> bool {
        self.slots
            .iter()
            .any(|slot| slot.module.module_type() == module_type)
    }

    pub fn module_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.slots.iter().map(|slot| slot.module.module_type())
    }

    /// Union of the features of all modules, in registration order.
    pub fn features(&self) -> Vec<&'static str> {
        let mut features: Vec<&'static str> = Vec::new();
        for slot in &self.slots {
            for feature in slot.module.features() {
                if !features.contains(feature) {
                    features.push(feature);
                }
            }
        }
        features
    }

    pub fn get<M: XmppModule + 'static>(&self) -> Option<&M> {
        self.slots.iter().find_map(downcast::<M>)
    }

    pub fn get_mut<M: XmppModule + 'static>(&mut self) -> Option<&mut M> {
        self.slots.iter_mut().find_map(|slot| {
            let module: &mut dyn XmppModule = slot.module.as_mut();
            module.as_any_mut().downcast_mut::<M>()
        })
    }

    /// Modules whose criteria match the element, in registration order.
    pub fn get_modules_for(&self, element: &Element) -> Vec<&dyn XmppModule> {
        self.slots
            .iter()
            .filter(|slot| slot_matches(slot, element))
            .map(|slot| slot.module.as_ref())
            .collect()
    }

    /// Runs `process` of every matching module.
    ///
    /// A failing or panicking module does not stop the others.
    pub fn process(&mut self, ctx: &mut Context, element: &Element) -> Dispatched {
        let mut outcome = Dispatched::Unhandled;
        for slot in self.slots.iter_mut() {
            if !slot_matches(slot, element) {
                continue;
            }
            let module_type = slot.module.module_type();
            trace!(module = module_type, element = element.name(), "processing");
            let result = catch_unwind(AssertUnwindSafe(|| slot.module.process(ctx, element)));
            let failure = match result {
                Ok(Ok(())) => None,
                Ok(Err(err)) => {
                    debug!(module = module_type, error = %err, "module failed");
                    Some(err)
                }
                Err(_) => {
                    error!(module = module_type, "module panicked while processing");
                    Some(XmppError::new(ErrorCondition::InternalServerError))
                }
            };
            outcome = match (outcome, failure) {
                (Dispatched::Failed(first), _) => Dispatched::Failed(first),
                (_, Some(err)) => Dispatched::Failed(err),
                (_, None) => Dispatched::Handled,
            };
        }
        outcome
    }

    /// Receive interceptor chain, `None` if an interceptor dropped the element.
    pub fn after_receive(&mut self, ctx: &mut Context, mut element: Element) -> Option<Element> {
        for slot in self.slots.iter_mut() {
            let module_type = slot.module.module_type();
            let Some(interceptor) = slot.module.interceptor() else {
                continue;
            };
            let input = element.clone();
            match catch_unwind(AssertUnwindSafe(|| interceptor.after_receive(ctx, input))) {
                Ok(Some(next)) => element = next,
                Ok(None) => {
                    debug!(module = module_type, "element dropped by interceptor");
                    return None;
                }
                Err(_) => error!(module = module_type, "receive interceptor panicked"),
            }
        }
        Some(element)
    }

    /// Send interceptor chain.
    pub fn before_send(&mut self, ctx: &mut Context, mut element: Element) -> Element {
        for slot in self.slots.iter_mut() {
            let module_type = slot.module.module_type();
            let Some(interceptor) = slot.module.interceptor() else {
                continue;
            };
            let input = element.clone();
            match catch_unwind(AssertUnwindSafe(|| interceptor.before_send(ctx, input))) {
                Ok(next) => element = next,
                Err(_) => error!(module = module_type, "send interceptor panicked"),
            }
        }
        element
    }

    /// Delivers an event to every module.
    pub fn on_event(&mut self, ctx: &mut Context, event: &Event) {
        for slot in self.slots.iter_mut() {
            let result = catch_unwind(AssertUnwindSafe(|| slot.module.on_event(ctx, event)));
            if result.is_err() {
                error!(
                    module = slot.module.module_type(),
                    event = event.event_type(),
                    "module panicked while handling an event"
                );
            }
        }
    }
}

fn slot_matches(slot: &ModuleSlot, element: &Element) -> bool {
    slot.criteria
        .as_ref()
        .is_some_and(|criteria| criteria.matches(element))
}
