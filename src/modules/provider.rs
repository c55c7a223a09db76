/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::fmt::Debug;

use super::ModuleError;
use super::XmppModule;

/// Static identity of a module, used only when wiring a client.
///
/// Providers are compared by their module type, which must be unique.
pub struct ModuleProvider {
    pub module_type: &'static str,
    /// Providers whose modules must be registered before this one.
    pub requires: &'static [&'static ModuleProvider],
    pub create: fn() -> Box<dyn XmppModule>,
}

impl ModuleProvider {
    pub fn instantiate(&self) -> Box<dyn XmppModule> {
        (self.create)()
    }
}

impl Debug for ModuleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleProvider")
            .field("module_type", &self.module_type)
            .field(
                "requires",
                &self.requires.iter().map(|p| p.module_type).collect::<Vec<_>>(),
            )
            .finish()
    }
}

fn visit(
    provider: &'static ModuleProvider,
    visiting: &mut Vec<&'static str>,
    order: &mut Vec<&'static ModuleProvider>,
) -> Result<(), ModuleError> {
    if order.iter().any(|p| p.module_type == provider.module_type) {
        return Ok(());
    }
    if visiting.contains(&provider.module_type) {
        return Err(ModuleError::DependencyCycle(provider.module_type));
    }
    visiting.push(provider.module_type);
    for dependency in provider.requires {
        visit(dependency, visiting, order)?;
    }
    visiting.pop();
    order.push(provider);
    Ok(())
}

/// Closes a provider list over its dependencies.
///
/// Every provider appears once, after all the providers it requires. Apart
/// from that the first seen order of the input is kept.
pub fn extend_for_dependencies(
    providers: &[&'static ModuleProvider],
) -> Result<Vec<&'static ModuleProvider>, ModuleError> {
    let mut order = Vec::with_capacity(providers.len());
    let mut visiting = Vec::new();
    for provider in providers {
        visit(provider, &mut visiting, &mut order)?;
    }
    Ok(order)
}
