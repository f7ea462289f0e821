// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Adapter selection for one wgpu backend.
//!
//! wgpu is asked for an adapter first; if it hands back one from another API, the
//! selector falls back to enumerating the backend's adapters and ranking them by the
//! requested power preference.

use async_trait::async_trait;

use khora_gpu_core::renderer::api::{AdapterInfo, AdapterType, GraphicsBackendType, PowerPreference};
use khora_gpu_core::renderer::traits::AdapterSelector;

use super::conversions::{adapter_info, backend_bits, IntoWgpu};

/// Picks adapters of a single native backend from a shared instance.
pub struct WgpuAdapterSelector {
    instance: wgpu::Instance,
    backend: GraphicsBackendType,
}

impl WgpuAdapterSelector {
    /// Creates a selector restricted to `backend`.
    pub fn new(instance: wgpu::Instance, backend: GraphicsBackendType) -> Self {
        Self { instance, backend }
    }

    fn enumerate(&self) -> Vec<wgpu::Adapter> {
        match backend_bits(self.backend) {
            Some(backends) => self.instance.enumerate_adapters(backends),
            None => Vec::new(),
        }
    }

    /// Ranks an adapter class for a power preference, lower is better.
    fn preference_rank(adapter_type: AdapterType, preference: PowerPreference) -> u8 {
        match (preference, adapter_type) {
            (PowerPreference::LowPower, AdapterType::IntegratedGpu) => 0,
            (PowerPreference::LowPower, AdapterType::DiscreteGpu) => 1,
            (PowerPreference::HighPerformance, AdapterType::DiscreteGpu) => 0,
            (PowerPreference::HighPerformance, AdapterType::IntegratedGpu) => 1,
            (PowerPreference::Default, AdapterType::DiscreteGpu | AdapterType::IntegratedGpu) => 0,
            (_, AdapterType::VirtualGpu) => 2,
            (_, AdapterType::Unknown) => 3,
            (_, AdapterType::Cpu) => 4,
        }
    }
}

#[async_trait]
impl AdapterSelector<wgpu::Adapter> for WgpuAdapterSelector {
    type Error = String;

    async fn select_adapter(
        &self,
        power_preference: PowerPreference,
    ) -> Result<(wgpu::Adapter, AdapterInfo), Self::Error> {
        log::info!("Selecting a {} adapter ({power_preference:?})...", self.backend);

        let requested = self
            .instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: power_preference.into_wgpu(),
                compatible_surface: None, // Surfaces are created per swap chain
                force_fallback_adapter: false,
            })
            .await;

        // Verify that the adapter is actually using the requested backend
        if let Ok(adapter) = requested {
            let info = adapter_info(&adapter.get_info());
            if info.backend == Some(self.backend) {
                return Ok((adapter, info));
            }
            log::debug!(
                "wgpu returned a {:?} adapter for {}, ranking adapters instead",
                info.backend,
                self.backend
            );
        }

        self.enumerate()
            .into_iter()
            .map(|adapter| {
                let info = adapter_info(&adapter.get_info());
                (adapter, info)
            })
            .min_by_key(|(_, info)| Self::preference_rank(info.adapter_type, power_preference))
            .ok_or_else(|| format!("no {} adapter available", self.backend))
    }

    async fn list_adapters(&self) -> Result<Vec<AdapterInfo>, Self::Error> {
        Ok(self
            .enumerate()
            .iter()
            .map(|adapter| adapter_info(&adapter.get_info()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_high_performance_prefers_discrete() {
        let rank = |ty| WgpuAdapterSelector::preference_rank(ty, PowerPreference::HighPerformance);
        assert!(rank(AdapterType::DiscreteGpu) < rank(AdapterType::IntegratedGpu));
        assert!(rank(AdapterType::IntegratedGpu) < rank(AdapterType::Cpu));
    }

    #[test]
    fn test_low_power_prefers_integrated() {
        let rank = |ty| WgpuAdapterSelector::preference_rank(ty, PowerPreference::LowPower);
        assert!(rank(AdapterType::IntegratedGpu) < rank(AdapterType::DiscreteGpu));
        assert!(rank(AdapterType::VirtualGpu) < rank(AdapterType::Cpu));
    }

    #[test]
    fn test_software_rasterizers_rank_last() {
        for preference in [
            PowerPreference::Default,
            PowerPreference::LowPower,
            PowerPreference::HighPerformance,
        ] {
            let cpu = WgpuAdapterSelector::preference_rank(AdapterType::Cpu, preference);
            for ty in [
                AdapterType::DiscreteGpu,
                AdapterType::IntegratedGpu,
                AdapterType::VirtualGpu,
                AdapterType::Unknown,
            ] {
                assert!(WgpuAdapterSelector::preference_rank(ty, preference) < cpu);
            }
        }
    }
}
