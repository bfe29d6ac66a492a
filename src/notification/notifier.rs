use std::sync::atomic::{AtomicBool, Ordering};

use crate::{
    notification::{EventListener, QueryEvent},
    QueryKey,
};

pub(crate) struct EventNotifier {
    listener: EventListener,
    is_enabled: AtomicBool,
    #[cfg(feature = "logging")]
    client_name: Option<String>,
}

impl EventNotifier {
    pub(crate) fn new(listener: EventListener, _client_name: Option<String>) -> Self {
        Self {
            listener,
            is_enabled: AtomicBool::new(true),
            #[cfg(feature = "logging")]
            client_name: _client_name,
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.is_enabled.load(Ordering::Acquire)
    }

    pub(crate) fn notify(&self, key: &QueryKey, event: QueryEvent) {
        use std::panic::{catch_unwind, AssertUnwindSafe};

        if !self.is_enabled() {
            return;
        }

        // Safety: It is safe to assert unwind safety here because we will not
        // call the listener again if it has been panicked.
        let result = catch_unwind(AssertUnwindSafe(|| (self.listener)(key, event)));
        if let Err(_payload) = result {
            self.is_enabled.store(false, Ordering::Release);
            #[cfg(feature = "logging")]
            log_panic(&*_payload, self.client_name.as_deref());
        }
    }
}

#[cfg(feature = "logging")]
fn log_panic(payload: &(dyn std::any::Any + Send + 'static), client_name: Option<&str>) {
    // Try to downcast the payload into &str or String.
    let message: Option<std::borrow::Cow<'_, str>> =
        (payload.downcast_ref::<&str>().map(|s| (*s).into()))
            .or_else(|| payload.downcast_ref::<String>().map(Into::into));

    let cn = client_name
        .map(|name| format!("[{name}] "))
        .unwrap_or_default();

    if let Some(m) = message {
        log::error!("{cn}Disabled the event listener because it panicked at '{m}'");
    } else {
        log::error!("{cn}Disabled the event listener because it panicked");
    }
}
