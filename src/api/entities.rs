use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::domain::{device_from_entity_id, Entity};

/// Thread-safe collection of entities keyed by entity id
#[derive(Default)]
pub struct EntityRegistry {
    entities: RwLock<BTreeMap<String, Entity>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entity
    pub async fn add(&self, entity: Entity) {
        self.entities
            .write()
            .await
            .insert(entity.entity_id.clone(), entity);
    }

    pub async fn contains(&self, entity_id: &str) -> bool {
        self.entities.read().await.contains_key(entity_id)
    }

    pub async fn get(&self, entity_id: &str) -> Option<Entity> {
        self.entities.read().await.get(entity_id).cloned()
    }

    pub async fn remove(&self, entity_id: &str) -> Option<Entity> {
        self.entities.write().await.remove(entity_id)
    }

    /// Drop every entity belonging to a hub, returns the removed ids
    pub async fn remove_device(&self, hub_id: &str) -> Vec<String> {
        let mut entities = self.entities.write().await;
        let ids: Vec<String> = entities
            .keys()
            .filter(|id| device_from_entity_id(id) == Some(hub_id))
            .cloned()
            .collect();
        for id in &ids {
            entities.remove(id);
        }
        ids
    }

    pub async fn clear(&self) {
        self.entities.write().await.clear();
    }

    pub async fn all(&self) -> Vec<Entity> {
        self.entities.read().await.values().cloned().collect()
    }

    pub async fn ids(&self) -> Vec<String> {
        self.entities.read().await.keys().cloned().collect()
    }

    /// Merge attributes into an entity; false if the entity is unknown
    pub async fn update_attributes(
        &self,
        entity_id: &str,
        attributes: &Map<String, Value>,
    ) -> bool {
        match self.entities.write().await.get_mut(entity_id) {
            Some(entity) => {
                entity.merge_attributes(attributes);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{cover_entity, scene_button_entity, SceneInfo, ShadeInfo};
    use serde_json::json;

    fn shade(id: &str) -> ShadeInfo {
        ShadeInfo {
            id: id.to_string(),
            name: format!("Shade {id}"),
            shade_type: "1".to_string(),
            position: Some(50),
        }
    }

    #[tokio::test]
    async fn test_add_replaces_existing() {
        let registry = EntityRegistry::new();
        registry.add(cover_entity("hub", &shade("1"))).await;
        let mut renamed = shade("1");
        renamed.name = "Bedroom".to_string();
        registry.add(cover_entity("hub", &renamed)).await;

        let all = registry.all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name["en"], "Bedroom");
    }

    #[tokio::test]
    async fn test_remove_device() {
        let registry = EntityRegistry::new();
        registry.add(cover_entity("a", &shade("1"))).await;
        registry.add(cover_entity("b", &shade("1"))).await;
        registry
            .add(scene_button_entity(
                "a",
                &SceneInfo {
                    id: "9".to_string(),
                    name: "Evening".to_string(),
                },
            ))
            .await;

        let mut removed = registry.remove_device("a").await;
        removed.sort();
        assert_eq!(removed, vec!["button.a.9", "cover.a.1"]);
        assert_eq!(registry.ids().await, vec!["cover.b.1"]);
    }

    #[tokio::test]
    async fn test_update_attributes() {
        let registry = EntityRegistry::new();
        registry.add(cover_entity("hub", &shade("1"))).await;

        let update = json!({"state": "CLOSED", "position": 0});
        assert!(
            registry
                .update_attributes("cover.hub.1", update.as_object().unwrap())
                .await
        );
        assert!(
            !registry
                .update_attributes("cover.hub.2", update.as_object().unwrap())
                .await
        );
        let entity = registry.get("cover.hub.1").await.unwrap();
        assert_eq!(entity.attributes["state"], "CLOSED");
        assert_eq!(entity.attributes["position"], 0);
    }
}
