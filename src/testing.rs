//! Recording collaborators shared by unit tests

use std::cell::RefCell;
use std::rc::Rc;

use crate::events::{EndpointId, EventBus, GameEvent, Topic};
use crate::game::player::{PlayerActors, PlayerId};
use crate::util::vec2::Vec2;

/// Captures every event a source publishes on the given topics
#[derive(Clone, Default)]
pub struct EventRecorder {
    events: Rc<RefCell<Vec<GameEvent>>>,
}

impl EventRecorder {
    pub fn attach(bus: &EventBus, source: EndpointId, topics: &[Topic]) -> Self {
        let recorder = Self::default();
        let target = bus.register("recorder", &[]);
        for topic in topics {
            let sink = recorder.events.clone();
            bus.subscribe(source, *topic, target, move |e| sink.borrow_mut().push(e.clone()));
        }
        recorder
    }

    pub fn events(&self) -> Vec<GameEvent> {
        self.events.borrow().clone()
    }

    pub fn count(&self, topic: Topic) -> usize {
        self.events.borrow().iter().filter(|e| e.topic() == topic).count()
    }

    pub fn of(&self, topic: Topic) -> Vec<GameEvent> {
        self.events
            .borrow()
            .iter()
            .filter(|e| e.topic() == topic)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

/// Actor layer that remembers what the core asked of it
#[derive(Debug, Default)]
pub struct RecordingActors {
    pub hidden: Vec<PlayerId>,
    pub shown: Vec<PlayerId>,
    pub respawned: Vec<(PlayerId, Vec2, f32)>,
}

impl PlayerActors for RecordingActors {
    fn set_renderable(&mut self, id: PlayerId, renderable: bool) {
        if renderable {
            self.shown.push(id);
        } else {
            self.hidden.push(id);
        }
    }

    fn respawn_actor(&mut self, id: PlayerId, position: Vec2, invincible_for: f32) {
        self.respawned.push((id, position, invincible_for));
    }
}

pub fn ids(raw: &[u32]) -> Vec<PlayerId> {
    raw.iter().map(|&n| PlayerId(n)).collect()
}
