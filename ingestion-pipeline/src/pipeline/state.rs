use state_machines::state_machine;

state_machine! {
    name: IngestionMachine,
    state: IngestionState,
    initial: Claimed,
    states: [Claimed, ChunksFetched, Extracted, Resolved, Committed, Failed],
    events {
        fetch_chunks { transition: { from: Claimed, to: ChunksFetched } }
        extract { transition: { from: ChunksFetched, to: Extracted } }
        resolve { transition: { from: Extracted, to: Resolved } }
        commit { transition: { from: Resolved, to: Committed } }
        abort {
            transition: { from: Claimed, to: Failed }
            transition: { from: ChunksFetched, to: Failed }
            transition: { from: Extracted, to: Failed }
            transition: { from: Resolved, to: Failed }
            transition: { from: Committed, to: Failed }
        }
    }
}

pub fn claimed() -> IngestionMachine<(), Claimed> {
    IngestionMachine::new(())
}
