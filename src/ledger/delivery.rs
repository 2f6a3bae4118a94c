//! Type-erased resolution values and the channels that carry them.

use std::any::{type_name, Any};
use std::fmt;

use futures::channel::{mpsc, oneshot};

use super::{Ledger, Outcome};
use crate::error::Error;

/// A resolution value with its static type erased.
///
/// Created by [`CascadeStep`](crate::cascade::CascadeStep) constructors and
/// by the typed resolve methods on [`Ledger`]; downcast back by the
/// suspension handle to the type its caller awaits.
pub struct Payload {
    value: Box<dyn Any + Send>,
    type_name: &'static str,
    debug: Option<String>,
}

impl Payload {
    pub(crate) fn new<T: Any + Send>(value: T) -> Self {
        Self {
            value: Box::new(value),
            type_name: type_name::<T>(),
            debug: None,
        }
    }

    pub(crate) fn failure<E: Any + Send + fmt::Debug>(error: E) -> Self {
        let debug = format!("{error:?}");
        Self {
            debug: Some(debug),
            ..Self::new(error)
        }
    }

    /// Name of the erased type.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn take_debug(&mut self) -> Option<String> {
        self.debug.take()
    }

    fn downcast<T: Any>(self) -> Result<T, &'static str> {
        let found = self.type_name;
        self.value.downcast::<T>().map(|boxed| *boxed).map_err(|_| found)
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.debug {
            Some(debug) => f.write_str(debug),
            None => write!(f, "<{}>", self.type_name),
        }
    }
}

/// Terminal item pushed to a parked caller.
pub(crate) enum Delivery {
    Success(Payload),
    Failure(Payload),
    Cancelled,
}

impl Delivery {
    pub(crate) fn outcome(&self) -> Outcome {
        match self {
            Delivery::Success(_) => Outcome::Success,
            Delivery::Failure(_) => Outcome::Failure,
            Delivery::Cancelled => Outcome::Cancelled,
        }
    }

    /// Converts into the caller's result. A type mismatch is recorded as an
    /// issue on `ledger` and returned as the caller's error.
    pub(crate) fn unpack<T, E>(self, index: usize, ledger: &Ledger) -> Result<T, E>
    where
        T: Any,
        E: From<Error> + Any,
    {
        let mismatch = |expected: &'static str, found: &'static str| {
            let error = Error::IncompatibleResultType {
                index,
                expected,
                found,
            };
            ledger.record_issue(error.clone());
            E::from(error)
        };

        match self {
            Delivery::Success(payload) => payload
                .downcast::<T>()
                .map_err(|found| mismatch(type_name::<T>(), found)),
            Delivery::Failure(payload) => match payload.downcast::<E>() {
                Ok(error) => Err(error),
                Err(found) => Err(mismatch(type_name::<E>(), found)),
            },
            Delivery::Cancelled => Err(E::from(Error::Cancelled)),
        }
    }
}

/// Producer side of an entry's suspension handle.
pub(crate) enum Sink {
    Continuation(oneshot::Sender<Delivery>),
    Subscription(mpsc::UnboundedSender<Delivery>),
    Spent,
}

impl Sink {
    /// Pushes the terminal item and closes the channel. Returns `false` if
    /// the consumer is gone.
    pub(crate) fn deliver(self, delivery: Delivery) -> bool {
        match self {
            Sink::Continuation(sender) => sender.send(delivery).is_ok(),
            Sink::Subscription(sender) => sender.unbounded_send(delivery).is_ok(),
            Sink::Spent => false,
        }
    }
}
