//! # Lista Ordenada de Timers
//! src/timer/list.rs
//!
//! Lista doblemente enlazada en orden ascendente de deadline, guardada en
//! una arena (`Vec` de slots) e indexada con handles estables.
//!
//! Cada handle lleva una generación: cuando un slot se libera la generación
//! aumenta, así que un handle viejo nunca puede reposicionar ni borrar el
//! timer de otra conexión que reutilizó el mismo slot.
//!
//! ```text
//! head → [t=3] ⇄ [t=5] ⇄ [t=5] ⇄ [t=9] ← tail
//! ```

use std::time::Instant;

/// Callback de expulsión: captura lo necesario para cerrar la conexión
pub type EvictFn = Box<dyn FnOnce() + Send + 'static>;

/// Handle estable a un timer dentro de la lista
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    index: usize,
    generation: u64,
}

/// Nodo de la lista
struct Entry {
    deadline: Instant,
    evict: Option<EvictFn>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Slot de la arena
struct Slot {
    generation: u64,
    entry: Option<Entry>,
}

/// Lista de timers ordenada ascendentemente por deadline
pub struct TimerList {
    slots: Vec<Slot>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl TimerList {
    /// Crea una lista vacía
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// Número de timers vivos
    pub fn len(&self) -> usize {
        self.len
    }

    /// Verifica si no hay timers
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserta un timer manteniendo el orden ascendente. O(n).
    ///
    /// Entre deadlines iguales se conserva el orden de llegada.
    pub fn insert(&mut self, deadline: Instant, evict: EvictFn) -> TimerHandle {
        let entry = Entry {
            deadline,
            evict: Some(evict),
            prev: None,
            next: None,
        };

        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index].entry = Some(entry);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                self.slots.len() - 1
            }
        };

        self.link_sorted(index, self.head);
        self.len += 1;

        TimerHandle {
            index,
            generation: self.slots[index].generation,
        }
    }

    /// Mueve un timer a un nuevo deadline.
    ///
    /// Si el nuevo deadline sigue siendo compatible con sus vecinos no hay
    /// cambio estructural; si no, se desenlaza y se reinserta en orden.
    /// Retorna `false` si el handle ya no es válido.
    pub fn reposition(&mut self, handle: TimerHandle, deadline: Instant) -> bool {
        let Some(index) = self.resolve(handle) else {
            return false;
        };

        let (old, prev, next) = {
            let entry = self.entry_mut(index);
            let old = entry.deadline;
            entry.deadline = deadline;
            (old, entry.prev, entry.next)
        };

        let after_prev = prev.map_or(true, |p| self.entry(p).deadline <= deadline);
        let before_next = next.map_or(true, |n| deadline <= self.entry(n).deadline);
        if after_prev && before_next {
            return true;
        }

        self.unlink(index);
        // Al extender el plazo basta con buscar desde el vecino siguiente
        let start = if deadline >= old { next } else { self.head };
        self.link_sorted(index, start);
        true
    }

    /// Quita un timer sin invocar su callback.
    ///
    /// Retorna `false` si el handle ya no es válido.
    pub fn remove(&mut self, handle: TimerHandle) -> bool {
        let Some(index) = self.resolve(handle) else {
            return false;
        };

        self.unlink(index);
        self.release(index);
        true
    }

    /// Expulsa todos los timers con deadline ≤ `now`, en orden ascendente.
    ///
    /// Cada callback se invoca exactamente una vez, después de sacar su
    /// nodo de la lista. Retorna cuántos timers se expulsaron.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let mut evicted = 0;

        while let Some(index) = self.head {
            if self.entry(index).deadline > now {
                break;
            }

            self.unlink(index);
            let evict = self.release(index);
            if let Some(evict) = evict {
                evict();
            }
            evicted += 1;
        }

        evicted
    }

    /// Deadline actual de un timer
    pub fn deadline(&self, handle: TimerHandle) -> Option<Instant> {
        self.resolve(handle).map(|index| self.entry(index).deadline)
    }

    /// Verifica si el handle sigue vivo
    pub fn contains(&self, handle: TimerHandle) -> bool {
        self.resolve(handle).is_some()
    }

    /// Deadline más próximo (cabeza de la lista)
    pub fn next_deadline(&self) -> Option<Instant> {
        self.head.map(|index| self.entry(index).deadline)
    }

    /// Todos los deadlines, de la cabeza a la cola
    pub fn deadlines(&self) -> Vec<Instant> {
        let mut out = Vec::with_capacity(self.len);
        let mut cursor = self.head;
        while let Some(index) = cursor {
            let entry = self.entry(index);
            out.push(entry.deadline);
            cursor = entry.next;
        }
        out
    }

    // === Helpers internos ===

    fn resolve(&self, handle: TimerHandle) -> Option<usize> {
        let slot = self.slots.get(handle.index)?;
        if slot.generation == handle.generation && slot.entry.is_some() {
            Some(handle.index)
        } else {
            None
        }
    }

    fn entry(&self, index: usize) -> &Entry {
        self.slots[index]
            .entry
            .as_ref()
            .expect("linked timer slot must be occupied")
    }

    fn entry_mut(&mut self, index: usize) -> &mut Entry {
        self.slots[index]
            .entry
            .as_mut()
            .expect("linked timer slot must be occupied")
    }

    /// Enlaza `index` antes del primer nodo con deadline estrictamente
    /// mayor, empezando la búsqueda en `start` (o al final si no hay).
    fn link_sorted(&mut self, index: usize, start: Option<usize>) {
        let deadline = self.entry(index).deadline;

        let mut cursor = start;
        while let Some(current) = cursor {
            if deadline < self.entry(current).deadline {
                break;
            }
            cursor = self.entry(current).next;
        }

        match cursor {
            Some(next) => {
                let prev = self.entry(next).prev;
                {
                    let entry = self.entry_mut(index);
                    entry.prev = prev;
                    entry.next = Some(next);
                }
                self.entry_mut(next).prev = Some(index);
                match prev {
                    Some(prev) => self.entry_mut(prev).next = Some(index),
                    None => self.head = Some(index),
                }
            }
            None => {
                let prev = self.tail;
                {
                    let entry = self.entry_mut(index);
                    entry.prev = prev;
                    entry.next = None;
                }
                match prev {
                    Some(prev) => self.entry_mut(prev).next = Some(index),
                    None => self.head = Some(index),
                }
                self.tail = Some(index);
            }
        }
    }

    fn unlink(&mut self, index: usize) {
        let (prev, next) = {
            let entry = self.entry_mut(index);
            let links = (entry.prev, entry.next);
            entry.prev = None;
            entry.next = None;
            links
        };

        match prev {
            Some(prev) => self.entry_mut(prev).next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.entry_mut(next).prev = prev,
            None => self.tail = prev,
        }
    }

    /// Libera el slot y devuelve el callback que tuviera pendiente
    fn release(&mut self, index: usize) -> Option<EvictFn> {
        let slot = &mut self.slots[index];
        let entry = slot.entry.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        self.len -= 1;
        entry.and_then(|mut e| e.evict.take())
    }
}

impl Default for TimerList {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn noop() -> EvictFn {
        Box::new(|| {})
    }

    fn recorder(log: &Arc<Mutex<Vec<u32>>>, id: u32) -> EvictFn {
        let log = Arc::clone(log);
        Box::new(move || log.lock().unwrap().push(id))
    }

    fn assert_sorted(list: &TimerList) {
        let deadlines = list.deadlines();
        assert_eq!(deadlines.len(), list.len());
        assert!(deadlines.windows(2).all(|w| w[0] <= w[1]), "list not sorted");
    }

    // ==================== Insert ====================

    #[test]
    fn test_insert_keeps_ascending_order() {
        let base = Instant::now();
        let mut list = TimerList::new();

        for secs in [9, 3, 5, 1, 7] {
            list.insert(base + Duration::from_secs(secs), noop());
        }

        assert_eq!(list.len(), 5);
        assert_sorted(&list);
        assert_eq!(list.next_deadline(), Some(base + Duration::from_secs(1)));
    }

    #[test]
    fn test_equal_deadlines_fire_in_insertion_order() {
        let base = Instant::now();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut list = TimerList::new();

        list.insert(base, recorder(&log, 1));
        list.insert(base, recorder(&log, 2));
        list.insert(base, recorder(&log, 3));

        assert_eq!(list.sweep(base), 3);
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
    }

    // ==================== Reposition ====================

    #[test]
    fn test_reposition_without_structural_change() {
        let base = Instant::now();
        let mut list = TimerList::new();

        let a = list.insert(base + Duration::from_secs(1), noop());
        list.insert(base + Duration::from_secs(10), noop());

        assert!(list.reposition(a, base + Duration::from_secs(5)));
        assert_eq!(list.next_deadline(), Some(base + Duration::from_secs(5)));
        assert_sorted(&list);
    }

    #[test]
    fn test_reposition_moves_head_to_tail() {
        let base = Instant::now();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut list = TimerList::new();

        let a = list.insert(base + Duration::from_secs(1), recorder(&log, 1));
        list.insert(base + Duration::from_secs(2), recorder(&log, 2));
        list.insert(base + Duration::from_secs(3), recorder(&log, 3));

        assert!(list.reposition(a, base + Duration::from_secs(10)));
        assert_sorted(&list);
        assert_eq!(list.len(), 3);

        list.sweep(base + Duration::from_secs(10));
        assert_eq!(*log.lock().unwrap(), vec![2, 3, 1]);
    }

    #[test]
    fn test_reposition_to_earlier_deadline() {
        let base = Instant::now();
        let mut list = TimerList::new();

        list.insert(base + Duration::from_secs(2), noop());
        let b = list.insert(base + Duration::from_secs(8), noop());

        assert!(list.reposition(b, base + Duration::from_secs(1)));
        assert_eq!(list.deadline(b), Some(base + Duration::from_secs(1)));
        assert_eq!(list.next_deadline(), Some(base + Duration::from_secs(1)));
        assert_sorted(&list);
    }

    // ==================== Remove ====================

    #[test]
    fn test_remove_does_not_invoke_callback() {
        let base = Instant::now();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut list = TimerList::new();

        let a = list.insert(base, recorder(&log, 1));
        assert!(list.remove(a));
        assert!(!list.contains(a));
        assert!(list.is_empty());

        assert_eq!(list.sweep(base + Duration::from_secs(60)), 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_stale_handle_is_rejected() {
        let base = Instant::now();
        let mut list = TimerList::new();

        let old = list.insert(base, noop());
        list.sweep(base);

        // El slot se reutiliza con otra generación
        let fresh = list.insert(base + Duration::from_secs(5), noop());
        assert!(!list.remove(old));
        assert!(!list.reposition(old, base));
        assert!(list.contains(fresh));
        assert_eq!(list.len(), 1);
    }

    // ==================== Sweep ====================

    #[test]
    fn test_sweep_evicts_exactly_past_due() {
        let base = Instant::now();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut list = TimerList::new();

        for (id, secs) in [(1, 4), (2, 1), (3, 6), (4, 3), (5, 3)] {
            list.insert(base + Duration::from_secs(secs), recorder(&log, id));
        }

        let evicted = list.sweep(base + Duration::from_secs(3));
        assert_eq!(evicted, 3);
        assert_eq!(*log.lock().unwrap(), vec![2, 4, 5]);
        assert_eq!(list.len(), 2);
        assert_eq!(list.next_deadline(), Some(base + Duration::from_secs(4)));
    }

    #[test]
    fn test_sweep_on_empty_list() {
        let mut list = TimerList::new();
        assert_eq!(list.sweep(Instant::now()), 0);
    }

    #[test]
    fn test_random_operations_keep_invariant() {
        let base = Instant::now();
        let mut list = TimerList::new();
        let mut handles = Vec::new();

        // LCG simple para una secuencia reproducible
        let mut seed: u64 = 0x2545_f491;
        let mut next = || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            seed >> 33
        };

        for _ in 0..500 {
            match next() % 3 {
                0 => {
                    let deadline = base + Duration::from_millis(next() % 1000);
                    handles.push(list.insert(deadline, noop()));
                }
                1 if !handles.is_empty() => {
                    let h = handles[(next() as usize) % handles.len()];
                    list.reposition(h, base + Duration::from_millis(next() % 1000));
                }
                _ if !handles.is_empty() => {
                    let h = handles.swap_remove((next() as usize) % handles.len());
                    assert!(list.remove(h));
                }
                _ => {}
            }
            assert_sorted(&list);
        }

        assert_eq!(list.len(), handles.len());

        let cutoff = base + Duration::from_millis(500);
        let due = list.deadlines().iter().filter(|d| **d <= cutoff).count();
        assert_eq!(list.sweep(cutoff), due);
        assert!(list.deadlines().iter().all(|d| *d > cutoff));
    }
}
